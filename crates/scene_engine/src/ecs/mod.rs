//! Entity-Component-System implementation
//!
//! Components are typed structs whose numeric members live in the shared
//! buffers of the memory subsystem. Entities are capability tables mapping a
//! component type to the SID of the instance attached to them. Systems are
//! plain functions run once per process stage.

pub mod component;
pub mod components;
pub mod entity;
pub mod repository;
pub mod stage;
pub mod systems;

#[cfg(test)]
mod tests;

pub use component::{
    Component, ComponentBase, ComponentSid, ComponentTid, CreateContext, EntityUid,
};
pub use entity::{Entity, EntityRepository};
pub use repository::{ComponentRepository, ComponentStore};
pub use stage::{ProcessStage, StageTracker};
pub use systems::LogicReport;

use crate::global_data::GlobalDataError;
use crate::memory::MemoryError;

/// ECS errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// No entity with this UID
    #[error("unknown entity: {0}")]
    UnknownEntity(EntityUid),

    /// The entity already has a component of this type
    #[error("{entity} already has a {component} component")]
    ComponentAlreadyAttached {
        /// Entity
        entity: EntityUid,
        /// Component type name
        component: &'static str,
    },

    /// The entity has no component of this type
    #[error("{entity} has no {component} component")]
    MissingComponent {
        /// Entity
        entity: EntityUid,
        /// Component type name
        component: &'static str,
    },

    /// A member slot was not allocated
    #[error("{component} is missing member slot {member}")]
    MissingMember {
        /// Component type name
        component: &'static str,
        /// Member name
        member: &'static str,
    },

    /// Component memory failure
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Global data failure
    #[error("global data error: {0}")]
    GlobalData(#[from] GlobalDataError),
}

/// Result type for ECS operations
pub type EcsResult<T> = Result<T, EcsError>;
