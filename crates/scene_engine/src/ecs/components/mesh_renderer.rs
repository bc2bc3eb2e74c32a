//! Draw state of a mesh
//!
//! The renderer asks the active strategy to load its mesh during Load. When
//! the mesh is not there yet the load is retried every frame until it
//! succeeds.

use crate::ecs::component::{Component, ComponentBase, ComponentSid, ComponentTid, CreateContext};
use crate::ecs::repository::{ComponentRepository, ComponentStore};
use crate::ecs::EcsResult;
use crate::memory::ElementSlot;

/// Per-entity draw state
#[derive(Debug, Clone)]
pub struct MeshRendererComponent {
    base: ComponentBase,
    mesh_sid: Option<ComponentSid>,
    scene_graph_sid: Option<ComponentSid>,
    is_culled: bool,
    is_loaded: bool,
    loaded_mesh_update_count: Option<u64>,
    load_attempts: u32,
}

impl Component for MeshRendererComponent {
    const TID: ComponentTid = ComponentTid::MESH_RENDERER;
    const NAME: &'static str = "MeshRenderer";

    fn from_slots(base: ComponentBase, _slots: &[ElementSlot]) -> EcsResult<Self> {
        Ok(Self {
            base,
            mesh_sid: None,
            scene_graph_sid: None,
            is_culled: false,
            is_loaded: false,
            loaded_mesh_update_count: None,
            load_attempts: 0,
        })
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn store(repo: &ComponentRepository) -> &ComponentStore<Self> {
        &repo.mesh_renderers
    }

    fn store_mut(repo: &mut ComponentRepository) -> &mut ComponentStore<Self> {
        &mut repo.mesh_renderers
    }

    fn on_create(&mut self, ctx: &mut CreateContext<'_>) -> EcsResult<()> {
        self.mesh_sid = ctx.siblings.get(&ComponentTid::MESH).copied();
        self.scene_graph_sid = ctx.siblings.get(&ComponentTid::SCENE_GRAPH).copied();
        if self.mesh_sid.is_none() {
            log::warn!(
                "MeshRenderer on {} has no Mesh component; nothing will be drawn",
                self.base.entity_uid
            );
        }
        Ok(())
    }
}

impl MeshRendererComponent {
    /// Mesh component of the same entity
    pub const fn mesh_sid(&self) -> Option<ComponentSid> {
        self.mesh_sid
    }

    /// Scene graph node of the same entity
    pub const fn scene_graph_sid(&self) -> Option<ComponentSid> {
        self.scene_graph_sid
    }

    /// Culled by the CPU frustum test of the current pass
    pub const fn is_culled(&self) -> bool {
        self.is_culled
    }

    pub(crate) fn set_culled(&mut self, culled: bool) {
        self.is_culled = culled;
    }

    /// Whether the strategy has set up this renderer's mesh
    pub const fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    /// Strategy load attempts so far
    pub const fn load_attempts(&self) -> u32 {
        self.load_attempts
    }

    /// Whether the strategy must (re)load the mesh
    pub(crate) fn needs_load(&self, mesh_update_count: u64) -> bool {
        !self.is_loaded || self.loaded_mesh_update_count != Some(mesh_update_count)
    }

    /// Record the outcome of a strategy load
    pub(crate) fn record_load(&mut self, loaded: bool, mesh_update_count: u64) {
        self.load_attempts += 1;
        self.is_loaded = loaded;
        self.loaded_mesh_update_count = loaded.then_some(mesh_update_count);
    }
}
