//! Component identity and the `Component` trait

use std::collections::BTreeMap;
use std::fmt;

use crate::global_data::GlobalDataRepository;
use crate::memory::{ElementSlot, MemberDescriptor, MemoryManager};

use super::repository::{ComponentRepository, ComponentStore};
use super::stage::{ProcessStage, StageTracker};
use super::{EcsError, EcsResult};

/// Component type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTid(pub u32);

impl ComponentTid {
    /// Local transform
    pub const TRANSFORM: Self = Self(1);
    /// World matrix hierarchy node
    pub const SCENE_GRAPH: Self = Self(2);
    /// Mesh reference
    pub const MESH: Self = Self(3);
    /// Draw state of a mesh
    pub const MESH_RENDERER: Self = Self(4);
    /// Light source
    pub const LIGHT: Self = Self(5);
    /// Camera
    pub const CAMERA: Self = Self(6);

    /// One past the highest built-in TID (size of per-TID tables)
    pub const COUNT: usize = 7;

    /// TID as a table index
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentTid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid{}", self.0)
    }
}

/// Serial id of a component within its type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentSid(pub u32);

impl ComponentSid {
    /// SID as an index
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityUid(pub u32);

impl fmt::Display for EntityUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity{}", self.0)
    }
}

/// State every component carries
#[derive(Debug, Clone)]
pub struct ComponentBase {
    /// Owning entity
    pub entity_uid: EntityUid,
    /// Component type
    pub component_tid: ComponentTid,
    /// Serial id within the type
    pub component_sid: ComponentSid,
    /// False once removed
    pub is_alive: bool,
    /// Whether this component took over a freed memory slot
    pub is_reuse: bool,
    stages: StageTracker,
}

impl ComponentBase {
    /// Base of a freshly allocated component
    pub fn new(
        entity_uid: EntityUid,
        component_tid: ComponentTid,
        component_sid: ComponentSid,
        is_reuse: bool,
    ) -> Self {
        Self {
            entity_uid,
            component_tid,
            component_sid,
            is_alive: true,
            is_reuse,
            stages: StageTracker::default(),
        }
    }

    /// Stage bookkeeping
    pub const fn stages(&self) -> &StageTracker {
        &self.stages
    }

    /// Whether `stage` may run next for this component
    pub const fn can_enter(&self, stage: ProcessStage) -> bool {
        self.is_alive && self.stages.can_enter(stage)
    }

    /// Record a stage; illegal transitions are logged and refused
    pub fn enter_stage(&mut self, stage: ProcessStage) -> bool {
        if !self.is_alive {
            return false;
        }
        let entered = self.stages.enter(stage);
        if !entered {
            log::warn!(
                "{} sid {} cannot enter {} after {:?}",
                self.component_tid,
                self.component_sid.0,
                stage,
                self.stages.last()
            );
        }
        entered
    }
}

/// Services available while a component wires itself up
pub struct CreateContext<'a> {
    /// Shared memory
    pub memory: &'a mut MemoryManager,
    /// Global shader data
    pub global: &'a mut GlobalDataRepository,
    /// Sibling components of the same entity
    pub siblings: &'a BTreeMap<ComponentTid, ComponentSid>,
}

/// A component type stored in shared memory
///
/// Members listed by [`Component::members`] get one slot each when an
/// instance is allocated; the slots are handed to [`Component::from_slots`]
/// in the same order.
pub trait Component: Sized + 'static {
    /// Type id
    const TID: ComponentTid;
    /// Human readable name for logs
    const NAME: &'static str;

    /// Members allocated per instance
    fn members() -> &'static [MemberDescriptor] {
        &[]
    }

    /// Build an instance around its freshly assigned slots
    fn from_slots(base: ComponentBase, slots: &[ElementSlot]) -> EcsResult<Self>;

    /// Shared state
    fn base(&self) -> &ComponentBase;

    /// Shared state, mutable
    fn base_mut(&mut self) -> &mut ComponentBase;

    /// Typed store inside the repository
    fn store(repo: &ComponentRepository) -> &ComponentStore<Self>;

    /// Typed store inside the repository, mutable
    fn store_mut(repo: &mut ComponentRepository) -> &mut ComponentStore<Self>;

    /// Create stage: wire up to sibling components and global data
    fn on_create(&mut self, _ctx: &mut CreateContext<'_>) -> EcsResult<()> {
        Ok(())
    }

    /// Called once when the component is removed
    fn on_destroy(&mut self, _memory: &mut MemoryManager, _global: &GlobalDataRepository) {}
}

/// Slot of member `index`, for use in `from_slots`
pub fn member_slot<C: Component>(slots: &[ElementSlot], index: usize) -> EcsResult<ElementSlot> {
    slots.get(index).copied().ok_or_else(|| EcsError::MissingMember {
        component: C::NAME,
        member: C::members().get(index).map_or("?", |m| m.name),
    })
}
