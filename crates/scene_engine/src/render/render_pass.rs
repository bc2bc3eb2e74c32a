//! Render pass description

use crate::ecs::{ComponentSid, EntityUid};

/// Render pass identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPassUid(pub u32);

/// One pass over the scene seen by one camera
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    uid: RenderPassUid,
    camera_sid: Option<ComponentSid>,
    entities: Option<Vec<EntityUid>>,
    cull: bool,
    display_idx: u32,
}

impl RenderPass {
    /// Pass drawing every mesh entity with the first camera
    pub const fn new(uid: RenderPassUid) -> Self {
        Self {
            uid,
            camera_sid: None,
            entities: None,
            cull: true,
            display_idx: 0,
        }
    }

    /// Draw through a specific camera
    pub const fn with_camera(mut self, camera_sid: ComponentSid) -> Self {
        self.camera_sid = Some(camera_sid);
        self
    }

    /// Restrict the pass to these entities
    pub fn with_entities(mut self, entities: Vec<EntityUid>) -> Self {
        self.entities = Some(entities);
        self
    }

    /// Enable or disable CPU frustum culling
    pub const fn with_culling(mut self, cull: bool) -> Self {
        self.cull = cull;
        self
    }

    /// Output (eye) index for multi-view rendering
    pub const fn with_display_idx(mut self, display_idx: u32) -> Self {
        self.display_idx = display_idx;
        self
    }

    /// Identifier
    pub const fn uid(&self) -> RenderPassUid {
        self.uid
    }

    /// Camera override
    pub const fn camera_sid(&self) -> Option<ComponentSid> {
        self.camera_sid
    }

    /// Whether `entity` takes part in this pass
    pub fn includes(&self, entity: EntityUid) -> bool {
        self.entities
            .as_ref()
            .map_or(true, |entities| entities.contains(&entity))
    }

    /// Whether CPU frustum culling is on
    pub const fn culls(&self) -> bool {
        self.cull
    }

    /// Output index
    pub const fn display_idx(&self) -> u32 {
        self.display_idx
    }
}
