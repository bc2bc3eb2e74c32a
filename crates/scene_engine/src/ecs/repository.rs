//! Typed component storage and slot allocation

use crate::foundation::collections::FreeList;
use crate::global_data::GlobalDataRepository;
use crate::memory::{
    aligned_byte_length, AccessorDesc, AccessorHandle, BufferUse, BufferViewDesc,
    ComponentMemoryRegistry, MemberDescriptor, MemberKey, MemoryManager,
};

use super::component::{Component, ComponentBase, ComponentSid, ComponentTid, EntityUid};
use super::components::{
    CameraComponent, LightComponent, MeshComponent, MeshRendererComponent, SceneGraphComponent,
    TransformComponent,
};
use super::stage::ProcessStage;
use super::EcsResult;

/// Instances of one component type, indexed by SID
///
/// Freed SIDs are handed out again, so a recreated component lands on the
/// memory its predecessor used.
#[derive(Debug, Clone)]
pub struct ComponentStore<C> {
    items: FreeList<C>,
}

impl<C: Component> ComponentStore<C> {
    /// Create an empty store
    pub const fn new() -> Self {
        Self {
            items: FreeList::new(),
        }
    }

    /// Component by SID
    pub fn get(&self, sid: ComponentSid) -> Option<&C> {
        self.items.get(sid.index())
    }

    /// Component by SID, mutable
    pub fn get_mut(&mut self, sid: ComponentSid) -> Option<&mut C> {
        self.items.get_mut(sid.index())
    }

    /// Live components with their SIDs
    pub fn iter(&self) -> impl Iterator<Item = (ComponentSid, &C)> {
        self.items
            .iter()
            .map(|(index, item)| (ComponentSid(index as u32), item))
    }

    /// Live components with their SIDs, mutable
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ComponentSid, &mut C)> {
        self.items
            .iter_mut()
            .map(|(index, item)| (ComponentSid(index as u32), item))
    }

    /// SIDs of live components, ascending
    pub fn sids(&self) -> Vec<ComponentSid> {
        self.iter().map(|(sid, _)| sid).collect()
    }

    /// Number of live components
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no component is alive
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Highest SID ever assigned plus one
    pub fn sid_high_water(&self) -> usize {
        self.items.capacity_used()
    }

    /// Allocate memory for the next instance and build it
    ///
    /// The SID picks the buffer view (`sid / per_view`) and the element inside
    /// it (`sid % per_view`). The first instance in a view takes one buffer
    /// view and accessor per member and records them in the registry. The
    /// element is always leased by index, so byte offsets survive reuse and
    /// an attempt that failed part way leaves no stray element behind.
    pub fn submit_to_allocation(
        &mut self,
        memory: &mut MemoryManager,
        registry: &mut ComponentMemoryRegistry,
        per_view: usize,
        entity_uid: EntityUid,
    ) -> EcsResult<ComponentSid> {
        let (index, is_reuse) = self.items.peek_next_index();
        let sid = ComponentSid(index as u32);

        registry.register_members(C::TID, C::members());
        if registry.get_component_count_per_buffer_view(C::TID).is_none() {
            registry.set_component_count_per_buffer_view(C::TID, per_view);
        }
        let per_view = registry
            .get_component_count_per_buffer_view(C::TID)
            .unwrap_or(per_view);
        let buffer_view_index = index / per_view;
        let local = (index % per_view) as u32;

        let mut slots = Vec::with_capacity(C::members().len());
        for member in C::members() {
            let key = MemberKey::new(C::TID, member.name, buffer_view_index);
            let accessor = match registry.get_accessor(&key) {
                Some(accessor) => accessor,
                None => allocate_member(memory, registry, key, member, per_view)?,
            };
            let slot = memory.take_existing(accessor, local)?;
            if !member.initial_value.is_empty() {
                memory.write_slot(slot, member.initial_value)?;
            }
            slots.push(slot);
        }

        let base = ComponentBase::new(entity_uid, C::TID, sid, is_reuse);
        let component = C::from_slots(base, &slots)?;
        let inserted = self.items.insert(component);
        debug_assert_eq!(inserted, index);

        log::debug!(
            "{} sid {} allocated for {} (view {}, element {}{})",
            C::NAME,
            sid.0,
            entity_uid,
            buffer_view_index,
            local,
            if is_reuse { ", reused" } else { "" }
        );
        Ok(sid)
    }

    /// Remove a component, freeing its SID for reuse
    pub fn remove(&mut self, sid: ComponentSid) -> Option<C> {
        let mut component = self.items.remove(sid.index())?;
        component.base_mut().is_alive = false;
        Some(component)
    }

    /// Record `stage` for every component allowed to enter it
    pub fn enter_stage(&mut self, stage: ProcessStage) -> usize {
        let mut entered = 0;
        for (_, component) in self.iter_mut() {
            if component.base().can_enter(stage) && component.base_mut().enter_stage(stage) {
                entered += 1;
            }
        }
        entered
    }
}

impl<C: Component> Default for ComponentStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn allocate_member(
    memory: &mut MemoryManager,
    registry: &mut ComponentMemoryRegistry,
    key: MemberKey,
    member: &MemberDescriptor,
    per_view: usize,
) -> EcsResult<AccessorHandle> {
    let usage = member.buffer_use;
    let element_length = if usage.min_alignment() == 16 {
        aligned_byte_length(member.composition_type, 1)
    } else {
        member.composition_type.number_of_components() * 4
    };
    let view = memory.take_buffer_view(
        usage,
        BufferViewDesc::new(element_length * per_view).with_align(usage.min_alignment()),
    )?;
    let accessor = memory.take_accessor(
        view,
        AccessorDesc::new(member.composition_type, per_view)
            .with_component_type(member.component_type),
    )?;
    let byte_offset = memory.accessor(accessor)?.byte_offset_in_buffer();
    registry.set_accessor(key, accessor);
    registry.set_byte_offset(key, byte_offset);
    if usage == BufferUse::GpuInstanceData {
        log::debug!(
            "{}.{} view {} at vec4 {}",
            key.component_tid,
            key.member_name,
            key.buffer_view_index,
            byte_offset / 16
        );
    }
    Ok(accessor)
}

/// Stores of every built-in component type
#[derive(Debug, Clone)]
pub struct ComponentRepository {
    pub(crate) transforms: ComponentStore<TransformComponent>,
    pub(crate) scene_graphs: ComponentStore<SceneGraphComponent>,
    pub(crate) meshes: ComponentStore<MeshComponent>,
    pub(crate) mesh_renderers: ComponentStore<MeshRendererComponent>,
    pub(crate) lights: ComponentStore<LightComponent>,
    pub(crate) cameras: ComponentStore<CameraComponent>,
    transform_generation: u64,
    max_components_per_view: usize,
}

impl ComponentRepository {
    /// Create empty stores; `max_components_per_view` instances share a view
    pub fn new(max_components_per_view: usize) -> Self {
        Self {
            transforms: ComponentStore::new(),
            scene_graphs: ComponentStore::new(),
            meshes: ComponentStore::new(),
            mesh_renderers: ComponentStore::new(),
            lights: ComponentStore::new(),
            cameras: ComponentStore::new(),
            transform_generation: 0,
            max_components_per_view: max_components_per_view.max(1),
        }
    }

    /// Allocate and store a new component
    pub fn create_component<C: Component>(
        &mut self,
        memory: &mut MemoryManager,
        registry: &mut ComponentMemoryRegistry,
        entity_uid: EntityUid,
    ) -> EcsResult<ComponentSid> {
        let per_view = self.max_components_per_view;
        C::store_mut(self).submit_to_allocation(memory, registry, per_view, entity_uid)
    }

    /// Store of a component type
    pub fn store<C: Component>(&self) -> &ComponentStore<C> {
        C::store(self)
    }

    /// Component by SID
    pub fn get<C: Component>(&self, sid: ComponentSid) -> Option<&C> {
        C::store(self).get(sid)
    }

    /// Component by SID, mutable
    pub fn get_mut<C: Component>(&mut self, sid: ComponentSid) -> Option<&mut C> {
        C::store_mut(self).get_mut(sid)
    }

    /// Remove a component
    pub fn remove<C: Component>(&mut self, sid: ComponentSid) -> Option<C> {
        C::store_mut(self).remove(sid)
    }

    /// Remove a component, running its destroy hook; false if absent
    pub fn destroy<C: Component>(
        &mut self,
        sid: ComponentSid,
        memory: &mut MemoryManager,
        global: &GlobalDataRepository,
    ) -> bool {
        match C::store_mut(self).remove(sid) {
            Some(mut component) => {
                component.on_destroy(memory, global);
                true
            }
            None => false,
        }
    }

    /// [`ComponentRepository::destroy`] for a type known only by TID
    pub fn destroy_by_tid(
        &mut self,
        tid: ComponentTid,
        sid: ComponentSid,
        memory: &mut MemoryManager,
        global: &GlobalDataRepository,
    ) -> bool {
        match tid {
            ComponentTid::TRANSFORM => self.destroy::<TransformComponent>(sid, memory, global),
            ComponentTid::SCENE_GRAPH => self.destroy::<SceneGraphComponent>(sid, memory, global),
            ComponentTid::MESH => self.destroy::<MeshComponent>(sid, memory, global),
            ComponentTid::MESH_RENDERER => {
                self.destroy::<MeshRendererComponent>(sid, memory, global)
            }
            ComponentTid::LIGHT => self.destroy::<LightComponent>(sid, memory, global),
            ComponentTid::CAMERA => self.destroy::<CameraComponent>(sid, memory, global),
            _ => {
                log::warn!("Cannot destroy component of unknown type {tid}");
                false
            }
        }
    }

    /// Bumped in Logic whenever any transform changed since the last Logic
    pub const fn transform_generation(&self) -> u64 {
        self.transform_generation
    }

    pub(crate) fn bump_transform_generation(&mut self) {
        self.transform_generation += 1;
    }

    /// Record `stage` for every component of every type allowed to enter it
    pub fn enter_stage(&mut self, stage: ProcessStage) -> usize {
        self.transforms.enter_stage(stage)
            + self.scene_graphs.enter_stage(stage)
            + self.meshes.enter_stage(stage)
            + self.mesh_renderers.enter_stage(stage)
            + self.lights.enter_stage(stage)
            + self.cameras.enter_stage(stage)
    }

    /// Total live components
    pub fn component_count(&self) -> usize {
        self.transforms.len()
            + self.scene_graphs.len()
            + self.meshes.len()
            + self.mesh_renderers.len()
            + self.lights.len()
            + self.cameras.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BufferCapacities;
    use crate::memory::MemoryError;

    #[test]
    fn test_failed_allocation_keeps_elements_at_sid() {
        // four lights per view: color needs 48 bytes, intensity 16 more
        let mut memory = MemoryManager::new(&BufferCapacities {
            cpu_generic: 56,
            ..BufferCapacities::default()
        });
        let mut registry = ComponentMemoryRegistry::new();
        let mut repo = ComponentRepository::new(4);

        for _ in 0..2 {
            let result =
                repo.create_component::<LightComponent>(&mut memory, &mut registry, EntityUid(0));
            assert!(matches!(
                result,
                Err(crate::ecs::EcsError::Memory(MemoryError::CapacityExceeded { .. }))
            ));
        }

        let color = registry
            .get_accessor(&MemberKey::new(ComponentTid::LIGHT, "color", 0))
            .unwrap();
        assert_eq!(memory.accessor(color).unwrap().taken_count(), 1);
        assert!(registry
            .get_accessor(&MemberKey::new(ComponentTid::LIGHT, "intensity", 0))
            .is_none());
        assert!(repo.store::<LightComponent>().is_empty());
        assert_eq!(repo.store::<LightComponent>().sid_high_water(), 0);
    }
}
