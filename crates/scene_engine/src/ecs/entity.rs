//! Entities as capability tables
//!
//! An entity is a UID plus a map from component type to the SID of the
//! instance attached to it. Typed access goes through the
//! [`ComponentRepository`](super::ComponentRepository) using that SID.

use std::collections::BTreeMap;

use crate::global_data::GlobalDataRepository;
use crate::memory::{ComponentMemoryRegistry, MemoryManager};

use super::component::{Component, ComponentSid, ComponentTid, EntityUid};
use super::repository::ComponentRepository;
use super::{EcsError, EcsResult};

/// An entity and its attached components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    uid: EntityUid,
    components: BTreeMap<ComponentTid, ComponentSid>,
}

impl Entity {
    /// Entity identifier
    pub const fn uid(&self) -> EntityUid {
        self.uid
    }

    /// Attached components by type
    pub const fn components(&self) -> &BTreeMap<ComponentTid, ComponentSid> {
        &self.components
    }

    /// SID of the attached component of type `tid`
    pub fn component_sid(&self, tid: ComponentTid) -> Option<ComponentSid> {
        self.components.get(&tid).copied()
    }

    /// Whether a component of type `tid` is attached
    pub fn has_component(&self, tid: ComponentTid) -> bool {
        self.components.contains_key(&tid)
    }
}

/// All live entities
#[derive(Debug, Clone, Default)]
pub struct EntityRepository {
    entities: BTreeMap<EntityUid, Entity>,
    next_uid: u32,
}

impl EntityRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entity with no components
    pub fn create_entity(&mut self) -> EntityUid {
        let uid = EntityUid(self.next_uid);
        self.next_uid += 1;
        self.entities.insert(
            uid,
            Entity {
                uid,
                components: BTreeMap::new(),
            },
        );
        log::debug!("Created {uid}");
        uid
    }

    /// Entity by UID
    pub fn get(&self, uid: EntityUid) -> Option<&Entity> {
        self.entities.get(&uid)
    }

    /// Live entities in UID order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether there are no entities
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Allocate a component of type `C` and attach it to `uid`
    pub fn add_component<C: Component>(
        &mut self,
        uid: EntityUid,
        components: &mut ComponentRepository,
        memory: &mut MemoryManager,
        registry: &mut ComponentMemoryRegistry,
    ) -> EcsResult<ComponentSid> {
        let entity = self
            .entities
            .get_mut(&uid)
            .ok_or(EcsError::UnknownEntity(uid))?;
        if entity.has_component(C::TID) {
            return Err(EcsError::ComponentAlreadyAttached {
                entity: uid,
                component: C::NAME,
            });
        }
        let sid = components.create_component::<C>(memory, registry, uid)?;
        entity.components.insert(C::TID, sid);
        Ok(sid)
    }

    /// SID of the component of type `C` attached to `uid`
    pub fn component_sid<C: Component>(&self, uid: EntityUid) -> Option<ComponentSid> {
        self.get(uid).and_then(|entity| entity.component_sid(C::TID))
    }

    /// Like [`EntityRepository::component_sid`] but with a descriptive error
    pub fn require_component_sid<C: Component>(&self, uid: EntityUid) -> EcsResult<ComponentSid> {
        let entity = self.get(uid).ok_or(EcsError::UnknownEntity(uid))?;
        entity
            .component_sid(C::TID)
            .ok_or(EcsError::MissingComponent {
                entity: uid,
                component: C::NAME,
            })
    }

    /// Whether `uid` has a component of type `C`
    pub fn has_component<C: Component>(&self, uid: EntityUid) -> bool {
        self.component_sid::<C>(uid).is_some()
    }

    /// Detach and destroy the component of type `C`
    pub fn remove_component<C: Component>(
        &mut self,
        uid: EntityUid,
        components: &mut ComponentRepository,
        memory: &mut MemoryManager,
        global: &GlobalDataRepository,
    ) -> EcsResult<()> {
        let entity = self
            .entities
            .get_mut(&uid)
            .ok_or(EcsError::UnknownEntity(uid))?;
        let sid = entity
            .components
            .remove(&C::TID)
            .ok_or(EcsError::MissingComponent {
                entity: uid,
                component: C::NAME,
            })?;
        components.destroy::<C>(sid, memory, global);
        Ok(())
    }

    /// Destroy an entity and every component attached to it
    pub fn destroy_entity(
        &mut self,
        uid: EntityUid,
        components: &mut ComponentRepository,
        memory: &mut MemoryManager,
        global: &GlobalDataRepository,
    ) -> EcsResult<()> {
        let entity = self
            .entities
            .remove(&uid)
            .ok_or(EcsError::UnknownEntity(uid))?;
        for (tid, sid) in entity.components {
            components.destroy_by_tid(tid, sid, memory, global);
        }
        log::debug!("Destroyed {uid}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BufferCapacities;
    use crate::ecs::components::{LightComponent, TransformComponent};

    fn setup() -> (EntityRepository, ComponentRepository, MemoryManager, ComponentMemoryRegistry) {
        (
            EntityRepository::new(),
            ComponentRepository::new(16),
            MemoryManager::new(&BufferCapacities::default()),
            ComponentMemoryRegistry::new(),
        )
    }

    #[test]
    fn test_add_and_lookup_component() {
        let (mut entities, mut components, mut memory, mut registry) = setup();
        let uid = entities.create_entity();

        let sid = entities
            .add_component::<TransformComponent>(uid, &mut components, &mut memory, &mut registry)
            .unwrap();

        assert_eq!(entities.component_sid::<TransformComponent>(uid), Some(sid));
        assert!(entities.has_component::<TransformComponent>(uid));
        assert!(!entities.has_component::<LightComponent>(uid));
        assert!(components.get::<TransformComponent>(sid).is_some());
    }

    #[test]
    fn test_duplicate_component_is_rejected() {
        let (mut entities, mut components, mut memory, mut registry) = setup();
        let uid = entities.create_entity();
        entities
            .add_component::<TransformComponent>(uid, &mut components, &mut memory, &mut registry)
            .unwrap();

        let err = entities
            .add_component::<TransformComponent>(uid, &mut components, &mut memory, &mut registry)
            .unwrap_err();
        assert!(matches!(err, EcsError::ComponentAlreadyAttached { .. }));
    }

    #[test]
    fn test_unknown_entity() {
        let (mut entities, mut components, mut memory, mut registry) = setup();
        let err = entities
            .add_component::<TransformComponent>(
                EntityUid(42),
                &mut components,
                &mut memory,
                &mut registry,
            )
            .unwrap_err();
        assert_eq!(err, EcsError::UnknownEntity(EntityUid(42)));
        assert!(entities
            .require_component_sid::<TransformComponent>(EntityUid(42))
            .is_err());
    }

    #[test]
    fn test_destroy_entity_frees_sids() {
        let (mut entities, mut components, mut memory, mut registry) = setup();
        let global = GlobalDataRepository::new(100);
        let first = entities.create_entity();
        let sid = entities
            .add_component::<TransformComponent>(first, &mut components, &mut memory, &mut registry)
            .unwrap();

        entities
            .destroy_entity(first, &mut components, &mut memory, &global)
            .unwrap();
        assert!(entities.get(first).is_none());
        assert!(components.get::<TransformComponent>(sid).is_none());

        let second = entities.create_entity();
        let reused = entities
            .add_component::<TransformComponent>(
                second,
                &mut components,
                &mut memory,
                &mut registry,
            )
            .unwrap();
        assert_eq!(reused, sid);
        assert!(components
            .get::<TransformComponent>(reused)
            .unwrap()
            .base()
            .is_reuse);
    }

    #[test]
    fn test_remove_missing_component() {
        let (mut entities, mut components, mut memory, _) = setup();
        let global = GlobalDataRepository::new(100);
        let uid = entities.create_entity();
        let err = entities
            .remove_component::<LightComponent>(uid, &mut components, &mut memory, &global)
            .unwrap_err();
        assert!(matches!(err, EcsError::MissingComponent { .. }));
    }
}
