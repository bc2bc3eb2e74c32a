//! Component member to memory lookup
//!
//! Maps `(component type, member, buffer view index)` to the accessor and byte
//! offset the member got. Every layout mutation bumps `state_version`;
//! anything derived from offsets (generated shader source, data texture
//! layout) compares against it and recomputes on change.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::accessor::AccessorHandle;
use super::buffer::BufferUse;
use super::composition::{ComponentType, CompositionType};
use super::layout::{LocationChunk, PropertyLayout, PropertyLocation};
use crate::ecs::ComponentTid;

/// Static description of one component member
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemberDescriptor {
    /// Buffer the member lives in
    pub buffer_use: BufferUse,
    /// Member name, also the shader semantic for instance data members
    pub name: &'static str,
    /// Element shape
    pub composition_type: CompositionType,
    /// Scalar type
    pub component_type: ComponentType,
    /// Value written when a slot is assigned
    pub initial_value: &'static [f32],
}

impl MemberDescriptor {
    /// Float member with an initial value
    pub const fn new(
        buffer_use: BufferUse,
        name: &'static str,
        composition_type: CompositionType,
        initial_value: &'static [f32],
    ) -> Self {
        Self {
            buffer_use,
            name,
            composition_type,
            component_type: ComponentType::Float,
            initial_value,
        }
    }
}

/// Composite registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey {
    /// Component type
    pub component_tid: ComponentTid,
    /// Member name
    pub member_name: &'static str,
    /// Buffer view the entry belongs to
    pub buffer_view_index: usize,
}

impl MemberKey {
    /// Build a key
    pub const fn new(
        component_tid: ComponentTid,
        member_name: &'static str,
        buffer_view_index: usize,
    ) -> Self {
        Self {
            component_tid,
            member_name,
            buffer_view_index,
        }
    }
}

/// Registry of component member allocations
#[derive(Debug, Clone, Default)]
pub struct ComponentMemoryRegistry {
    accessors: HashMap<MemberKey, AccessorHandle>,
    byte_offsets: HashMap<MemberKey, usize>,
    count_per_buffer_view: HashMap<ComponentTid, usize>,
    components: BTreeSet<ComponentTid>,
    members: BTreeMap<ComponentTid, Vec<MemberDescriptor>>,
    state_version: u64,
}

impl ComponentMemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout version; strictly increases on every mutation
    pub const fn state_version(&self) -> u64 {
        self.state_version
    }

    fn increment_state_version(&mut self) {
        self.state_version += 1;
    }

    /// Create the (empty) maps for a component type
    ///
    /// Idempotent: a second call adds nothing and leaves the version alone.
    pub fn ensure_accessor_maps_for_component(&mut self, tid: ComponentTid) {
        if self.components.insert(tid) {
            self.increment_state_version();
        }
    }

    /// Whether maps exist for a component type
    pub fn has_component(&self, tid: ComponentTid) -> bool {
        self.components.contains(&tid)
    }

    /// Record the member list of a component type
    pub fn register_members(&mut self, tid: ComponentTid, members: &[MemberDescriptor]) {
        self.ensure_accessor_maps_for_component(tid);
        if !self.members.contains_key(&tid) {
            self.members.insert(tid, members.to_vec());
            self.increment_state_version();
        }
    }

    /// Member descriptor of a component type
    pub fn member(&self, tid: ComponentTid, name: &str) -> Option<&MemberDescriptor> {
        self.members.get(&tid)?.iter().find(|m| m.name == name)
    }

    /// Every registered member living in `buffer_use`, by component type
    pub fn members_in(&self, buffer_use: BufferUse) -> Vec<(ComponentTid, MemberDescriptor)> {
        self.members
            .iter()
            .flat_map(|(tid, members)| {
                members
                    .iter()
                    .filter(move |m| m.buffer_use == buffer_use)
                    .map(move |m| (*tid, *m))
            })
            .collect()
    }

    /// Store the accessor of a member in a buffer view
    pub fn set_accessor(&mut self, key: MemberKey, accessor: AccessorHandle) {
        self.components.insert(key.component_tid);
        self.accessors.insert(key, accessor);
        self.increment_state_version();
    }

    /// Accessor of a member in a buffer view
    pub fn get_accessor(&self, key: &MemberKey) -> Option<AccessorHandle> {
        self.accessors.get(key).copied()
    }

    /// Store the byte offset of a member in a buffer view
    pub fn set_byte_offset(&mut self, key: MemberKey, byte_offset: usize) {
        self.components.insert(key.component_tid);
        self.byte_offsets.insert(key, byte_offset);
        self.increment_state_version();
    }

    /// Byte offset of a member in a buffer view
    pub fn get_byte_offset(&self, key: &MemberKey) -> Option<usize> {
        self.byte_offsets.get(key).copied()
    }

    /// All accessors of a member, ordered by buffer view index
    pub fn accessors_for_member(
        &self,
        tid: ComponentTid,
        member_name: &str,
    ) -> Vec<(usize, AccessorHandle)> {
        let mut entries: Vec<_> = self
            .accessors
            .iter()
            .filter(|(key, _)| key.component_tid == tid && key.member_name == member_name)
            .map(|(key, accessor)| (key.buffer_view_index, *accessor))
            .collect();
        entries.sort_by_key(|(index, _)| *index);
        entries
    }

    /// All byte offsets of a member, ordered by buffer view index
    pub fn byte_offsets_for_member(
        &self,
        tid: ComponentTid,
        member_name: &str,
    ) -> Vec<(usize, usize)> {
        let mut entries: Vec<_> = self
            .byte_offsets
            .iter()
            .filter(|(key, _)| key.component_tid == tid && key.member_name == member_name)
            .map(|(key, offset)| (key.buffer_view_index, *offset))
            .collect();
        entries.sort_by_key(|(index, _)| *index);
        entries
    }

    /// Record how many components share one buffer view
    pub fn set_component_count_per_buffer_view(&mut self, tid: ComponentTid, count: usize) {
        self.components.insert(tid);
        self.count_per_buffer_view.insert(tid, count);
        self.increment_state_version();
    }

    /// Components per buffer view
    pub fn get_component_count_per_buffer_view(&self, tid: ComponentTid) -> Option<usize> {
        self.count_per_buffer_view.get(&tid).copied()
    }

    /// vec4 location of an instance data member across all its buffer views
    ///
    /// Returns `None` until at least one instance has been allocated.
    pub fn location_of_member(
        &self,
        tid: ComponentTid,
        member_name: &str,
    ) -> Option<PropertyLocation> {
        let member = self.member(tid, member_name)?;
        let per_view = self.get_component_count_per_buffer_view(tid)?;
        let offsets = self.byte_offsets_for_member(tid, member_name);
        if offsets.is_empty() {
            return None;
        }
        let chunks = offsets
            .into_iter()
            .map(|(_, byte_offset)| LocationChunk {
                vec4_offset: byte_offset / 16,
                instance_count: per_view,
            })
            .collect();
        Some(PropertyLocation::from_chunks(
            PropertyLayout::new(member.composition_type, 1),
            chunks,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(index: u32) -> AccessorHandle {
        AccessorHandle {
            usage: BufferUse::GpuInstanceData,
            index,
        }
    }

    #[test]
    fn test_byte_offset_round_trip_and_version() {
        let mut registry = ComponentMemoryRegistry::new();
        let key = MemberKey::new(ComponentTid::SCENE_GRAPH, "worldMatrix", 0);

        let v0 = registry.state_version();
        registry.set_byte_offset(key, 256);
        let v1 = registry.state_version();
        registry.set_accessor(key, handle(3));
        let v2 = registry.state_version();

        assert!(v0 < v1 && v1 < v2);
        assert_eq!(registry.get_byte_offset(&key), Some(256));
        assert_eq!(registry.get_accessor(&key), Some(handle(3)));

        // same value again still counts as a mutation
        registry.set_byte_offset(key, 256);
        assert!(registry.state_version() > v2);
    }

    #[test]
    fn test_ensure_accessor_maps_is_idempotent() {
        let mut registry = ComponentMemoryRegistry::new();
        registry.ensure_accessor_maps_for_component(ComponentTid::CAMERA);
        let version = registry.state_version();
        registry.ensure_accessor_maps_for_component(ComponentTid::CAMERA);
        assert_eq!(registry.state_version(), version);
        assert!(registry.has_component(ComponentTid::CAMERA));
    }

    #[test]
    fn test_members_enumerated_by_view_index() {
        let mut registry = ComponentMemoryRegistry::new();
        let tid = ComponentTid::SCENE_GRAPH;
        registry.set_byte_offset(MemberKey::new(tid, "worldMatrix", 1), 4096);
        registry.set_byte_offset(MemberKey::new(tid, "worldMatrix", 0), 0);
        registry.set_byte_offset(MemberKey::new(tid, "normalMatrix", 0), 512);
        assert_eq!(
            registry.byte_offsets_for_member(tid, "worldMatrix"),
            vec![(0, 0), (1, 4096)]
        );
        assert!(registry.byte_offsets_for_member(ComponentTid::LIGHT, "worldMatrix").is_empty());
    }

    #[test]
    fn test_location_of_member_chunks() {
        const MEMBERS: &[MemberDescriptor] = &[MemberDescriptor::new(
            BufferUse::GpuInstanceData,
            "worldMatrix",
            CompositionType::Mat4,
            &[],
        )];
        let mut registry = ComponentMemoryRegistry::new();
        let tid = ComponentTid::SCENE_GRAPH;
        registry.register_members(tid, MEMBERS);
        registry.set_component_count_per_buffer_view(tid, 4);
        registry.set_byte_offset(MemberKey::new(tid, "worldMatrix", 0), 32);
        registry.set_byte_offset(MemberKey::new(tid, "worldMatrix", 1), 1024);

        let location = registry.location_of_member(tid, "worldMatrix").unwrap();
        assert_eq!(location.vec4_index(0, 0), Some(2));
        assert_eq!(location.vec4_index(5, 0), Some(64 + 4));
        assert_eq!(registry.members_in(BufferUse::GpuInstanceData).len(), 1);
    }
}
