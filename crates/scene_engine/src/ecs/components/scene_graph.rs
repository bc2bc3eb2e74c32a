//! Scene graph node component
//!
//! Holds the world and normal matrix of an entity in GPU instance data.
//! Nodes are processed parents-first; a node recomputes only when its
//! transform or its parent changed since its last recompute.

use crate::ecs::component::{
    member_slot, Component, ComponentBase, ComponentSid, ComponentTid, CreateContext,
};
use crate::ecs::repository::{ComponentRepository, ComponentStore};
use crate::ecs::EcsResult;
use crate::foundation::math::{normal_matrix, world_position, Mat3, Mat4, Vec3};
use crate::memory::{BufferUse, CompositionType, ElementSlot, MemberDescriptor, MemoryManager};

const IDENTITY_MAT4: &[f32] = &[
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

const IDENTITY_MAT3: &[f32] = &[
    1.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, //
    0.0, 0.0, 1.0,
];

const MEMBERS: &[MemberDescriptor] = &[
    MemberDescriptor::new(
        BufferUse::GpuInstanceData,
        "worldMatrix",
        CompositionType::Mat4,
        IDENTITY_MAT4,
    ),
    MemberDescriptor::new(
        BufferUse::GpuInstanceData,
        "normalMatrix",
        CompositionType::Mat3,
        IDENTITY_MAT3,
    ),
    MemberDescriptor::new(
        BufferUse::GpuInstanceData,
        "isVisible",
        CompositionType::Scalar,
        &[1.0],
    ),
    MemberDescriptor::new(
        BufferUse::GpuInstanceData,
        "isBillboard",
        CompositionType::Scalar,
        &[0.0],
    ),
];

/// Hierarchy node with GPU-visible world state
#[derive(Debug, Clone)]
pub struct SceneGraphComponent {
    base: ComponentBase,
    world_matrix: ElementSlot,
    normal_matrix: ElementSlot,
    is_visible: ElementSlot,
    is_billboard: ElementSlot,
    parent: Option<ComponentSid>,
    transform_sid: Option<ComponentSid>,
    update_count: u64,
    cached_inputs: Option<(u64, u64)>,
}

impl Component for SceneGraphComponent {
    const TID: ComponentTid = ComponentTid::SCENE_GRAPH;
    const NAME: &'static str = "SceneGraph";

    fn members() -> &'static [MemberDescriptor] {
        MEMBERS
    }

    fn from_slots(base: ComponentBase, slots: &[ElementSlot]) -> EcsResult<Self> {
        Ok(Self {
            base,
            world_matrix: member_slot::<Self>(slots, 0)?,
            normal_matrix: member_slot::<Self>(slots, 1)?,
            is_visible: member_slot::<Self>(slots, 2)?,
            is_billboard: member_slot::<Self>(slots, 3)?,
            parent: None,
            transform_sid: None,
            update_count: 0,
            cached_inputs: None,
        })
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn store(repo: &ComponentRepository) -> &ComponentStore<Self> {
        &repo.scene_graphs
    }

    fn store_mut(repo: &mut ComponentRepository) -> &mut ComponentStore<Self> {
        &mut repo.scene_graphs
    }

    fn on_create(&mut self, ctx: &mut CreateContext<'_>) -> EcsResult<()> {
        self.transform_sid = ctx.siblings.get(&ComponentTid::TRANSFORM).copied();
        Ok(())
    }
}

impl SceneGraphComponent {
    /// Times the world matrix was recomputed
    pub const fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Parent node
    pub const fn parent(&self) -> Option<ComponentSid> {
        self.parent
    }

    /// Attach to (or detach from) a parent node; takes effect next Logic
    pub fn set_parent(&mut self, parent: Option<ComponentSid>) {
        if parent == Some(self.base.component_sid) {
            log::warn!("Scene graph sid {} cannot parent itself", self.base.component_sid.0);
            return;
        }
        self.parent = parent;
        self.cached_inputs = None;
    }

    /// Transform of the same entity, wired at create
    pub const fn transform_sid(&self) -> Option<ComponentSid> {
        self.transform_sid
    }

    /// World matrix
    pub fn world_matrix(&self, memory: &MemoryManager) -> EcsResult<Mat4> {
        Ok(Mat4::from_column_slice(memory.read_slot(self.world_matrix)?))
    }

    /// Normal matrix
    pub fn normal_matrix(&self, memory: &MemoryManager) -> EcsResult<Mat3> {
        Ok(Mat3::from_column_slice(memory.read_slot(self.normal_matrix)?))
    }

    /// World position
    pub fn world_position(&self, memory: &MemoryManager) -> EcsResult<Vec3> {
        Ok(world_position(&self.world_matrix(memory)?))
    }

    /// Visibility flag
    pub fn is_visible(&self, memory: &MemoryManager) -> EcsResult<bool> {
        Ok(memory.read_slot(self.is_visible)?[0] > 0.5)
    }

    /// Set the visibility flag
    pub fn set_visible(&mut self, memory: &mut MemoryManager, visible: bool) -> EcsResult<()> {
        memory.write_slot(self.is_visible, &[if visible { 1.0 } else { 0.0 }])?;
        Ok(())
    }

    /// Billboard flag
    pub fn is_billboard(&self, memory: &MemoryManager) -> EcsResult<bool> {
        Ok(memory.read_slot(self.is_billboard)?[0] > 0.5)
    }

    /// Set the billboard flag
    pub fn set_billboard(&mut self, memory: &mut MemoryManager, billboard: bool) -> EcsResult<()> {
        memory.write_slot(self.is_billboard, &[if billboard { 1.0 } else { 0.0 }])?;
        Ok(())
    }

    /// Whether the inputs differ from the last recompute
    pub(crate) fn needs_update(&self, transform_count: u64, parent_count: u64) -> bool {
        self.cached_inputs != Some((transform_count, parent_count))
    }

    /// Store a recomputed world matrix and its normal matrix
    pub(crate) fn apply_world(
        &mut self,
        memory: &mut MemoryManager,
        world: &Mat4,
        transform_count: u64,
        parent_count: u64,
    ) -> EcsResult<()> {
        memory.write_slot(self.world_matrix, world.as_slice())?;
        memory.write_slot(self.normal_matrix, normal_matrix(world).as_slice())?;
        self.cached_inputs = Some((transform_count, parent_count));
        self.update_count += 1;
        Ok(())
    }
}
