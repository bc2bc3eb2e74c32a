//! Local transform component
//!
//! Translation, rotation (quaternion `xyzw`) and scale live in CPU memory.
//! Every setter bumps the component's update count; the Logic stage folds
//! those into the repository-wide transform generation.

use crate::ecs::component::{member_slot, Component, ComponentBase, ComponentTid};
use crate::ecs::repository::{ComponentRepository, ComponentStore};
use crate::ecs::EcsResult;
use crate::foundation::math::{compose_trs, Mat4, Quat, Quaternion, Vec3, Vec4};
use crate::memory::{BufferUse, CompositionType, ElementSlot, MemberDescriptor, MemoryManager};

const MEMBERS: &[MemberDescriptor] = &[
    MemberDescriptor::new(
        BufferUse::CpuGeneric,
        "translate",
        CompositionType::Vec3,
        &[0.0, 0.0, 0.0],
    ),
    MemberDescriptor::new(
        BufferUse::CpuGeneric,
        "rotate",
        CompositionType::Vec4,
        &[0.0, 0.0, 0.0, 1.0],
    ),
    MemberDescriptor::new(
        BufferUse::CpuGeneric,
        "scale",
        CompositionType::Vec3,
        &[1.0, 1.0, 1.0],
    ),
];

/// Local translate/rotate/scale of an entity
#[derive(Debug, Clone)]
pub struct TransformComponent {
    base: ComponentBase,
    translate: ElementSlot,
    rotate: ElementSlot,
    scale: ElementSlot,
    update_count: u64,
    seen_by_logic: Option<u64>,
}

impl Component for TransformComponent {
    const TID: ComponentTid = ComponentTid::TRANSFORM;
    const NAME: &'static str = "Transform";

    fn members() -> &'static [MemberDescriptor] {
        MEMBERS
    }

    fn from_slots(base: ComponentBase, slots: &[ElementSlot]) -> EcsResult<Self> {
        Ok(Self {
            base,
            translate: member_slot::<Self>(slots, 0)?,
            rotate: member_slot::<Self>(slots, 1)?,
            scale: member_slot::<Self>(slots, 2)?,
            update_count: 0,
            seen_by_logic: None,
        })
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn store(repo: &ComponentRepository) -> &ComponentStore<Self> {
        &repo.transforms
    }

    fn store_mut(repo: &mut ComponentRepository) -> &mut ComponentStore<Self> {
        &mut repo.transforms
    }
}

impl TransformComponent {
    /// Number of changes made through the setters
    pub const fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Translation
    pub fn translate(&self, memory: &MemoryManager) -> EcsResult<Vec3> {
        Ok(Vec3::from_column_slice(memory.read_slot(self.translate)?))
    }

    /// Set the translation
    pub fn set_translate(&mut self, memory: &mut MemoryManager, value: Vec3) -> EcsResult<()> {
        memory.write_slot(self.translate, value.as_slice())?;
        self.update_count += 1;
        Ok(())
    }

    /// Rotation
    pub fn rotate(&self, memory: &MemoryManager) -> EcsResult<Quat> {
        let xyzw = Vec4::from_column_slice(memory.read_slot(self.rotate)?);
        Ok(Quat::new_normalize(Quaternion::from(xyzw)))
    }

    /// Set the rotation
    pub fn set_rotate(&mut self, memory: &mut MemoryManager, value: Quat) -> EcsResult<()> {
        memory.write_slot(self.rotate, value.coords.as_slice())?;
        self.update_count += 1;
        Ok(())
    }

    /// Scale
    pub fn scale(&self, memory: &MemoryManager) -> EcsResult<Vec3> {
        Ok(Vec3::from_column_slice(memory.read_slot(self.scale)?))
    }

    /// Set the scale
    pub fn set_scale(&mut self, memory: &mut MemoryManager, value: Vec3) -> EcsResult<()> {
        memory.write_slot(self.scale, value.as_slice())?;
        self.update_count += 1;
        Ok(())
    }

    /// Local matrix (translate * rotate * scale)
    pub fn local_matrix(&self, memory: &MemoryManager) -> EcsResult<Mat4> {
        Ok(compose_trs(
            &self.translate(memory)?,
            &self.rotate(memory)?,
            &self.scale(memory)?,
        ))
    }

    /// Whether the transform changed since the previous call
    pub(crate) fn take_logic_change(&mut self) -> bool {
        let changed = self.seen_by_logic != Some(self.update_count);
        self.seen_by_logic = Some(self.update_count);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BufferCapacities;
    use crate::ecs::EntityUid;
    use crate::memory::ComponentMemoryRegistry;
    use approx::assert_relative_eq;

    #[test]
    fn test_initial_values_and_setters() {
        let mut memory = MemoryManager::new(&BufferCapacities::default());
        let mut registry = ComponentMemoryRegistry::new();
        let mut repo = ComponentRepository::new(4);
        let sid = repo
            .create_component::<TransformComponent>(&mut memory, &mut registry, EntityUid(0))
            .unwrap();

        let transform = repo.get_mut::<TransformComponent>(sid).unwrap();
        assert_eq!(transform.scale(&memory).unwrap(), Vec3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(transform.local_matrix(&memory).unwrap(), Mat4::identity());

        transform
            .set_translate(&mut memory, Vec3::new(1.0, 2.0, 3.0))
            .unwrap();
        assert_eq!(transform.update_count(), 1);
        let m = transform.local_matrix(&memory).unwrap();
        assert_relative_eq!(m[(0, 3)], 1.0);
        assert_relative_eq!(m[(2, 3)], 3.0);
    }

    #[test]
    fn test_logic_change_is_consumed_once() {
        let mut memory = MemoryManager::new(&BufferCapacities::default());
        let mut registry = ComponentMemoryRegistry::new();
        let mut repo = ComponentRepository::new(4);
        let sid = repo
            .create_component::<TransformComponent>(&mut memory, &mut registry, EntityUid(0))
            .unwrap();
        let transform = repo.get_mut::<TransformComponent>(sid).unwrap();
        assert!(transform.take_logic_change());
        assert!(!transform.take_logic_change());
        transform
            .set_scale(&mut memory, Vec3::new(2.0, 2.0, 2.0))
            .unwrap();
        assert!(transform.take_logic_change());
    }
}
