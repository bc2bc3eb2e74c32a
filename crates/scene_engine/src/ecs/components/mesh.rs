//! Mesh reference component

use crate::ecs::component::{Component, ComponentBase, ComponentTid};
use crate::ecs::repository::{ComponentRepository, ComponentStore};
use crate::ecs::EcsResult;
use crate::memory::ElementSlot;
use crate::render::mesh::MeshUid;

/// Points an entity at a mesh in the mesh repository
#[derive(Debug, Clone)]
pub struct MeshComponent {
    base: ComponentBase,
    mesh: Option<MeshUid>,
    update_count: u64,
}

impl Component for MeshComponent {
    const TID: ComponentTid = ComponentTid::MESH;
    const NAME: &'static str = "Mesh";

    fn from_slots(base: ComponentBase, _slots: &[ElementSlot]) -> EcsResult<Self> {
        Ok(Self {
            base,
            mesh: None,
            update_count: 0,
        })
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn store(repo: &ComponentRepository) -> &ComponentStore<Self> {
        &repo.meshes
    }

    fn store_mut(repo: &mut ComponentRepository) -> &mut ComponentStore<Self> {
        &mut repo.meshes
    }
}

impl MeshComponent {
    /// Mesh set on this component
    pub const fn mesh(&self) -> Option<MeshUid> {
        self.mesh
    }

    /// Point at a mesh (or clear it)
    pub fn set_mesh(&mut self, mesh: Option<MeshUid>) {
        self.mesh = mesh;
        self.update_count += 1;
    }

    /// Number of mesh changes
    pub const fn update_count(&self) -> u64 {
        self.update_count
    }
}
