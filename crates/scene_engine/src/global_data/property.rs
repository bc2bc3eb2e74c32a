//! Registered global properties and their leased values

use crate::memory::{
    AccessorHandle, ElementSlot, MemoryManager, MemoryResult, PropertyLayout, PropertyValue,
};

use super::semantic::{ShaderSemantic, ShaderSemanticsInfo};

/// A registered global property
#[derive(Debug, Clone)]
pub struct GlobalPropertyStruct {
    /// Description the property was registered with
    pub info: ShaderSemanticsInfo,
    /// Memory layout of one instance
    pub layout: PropertyLayout,
    /// Maximum number of leases
    pub max_count: usize,
    /// Accessor holding all `max_count` instances
    pub accessor: AccessorHandle,
    /// Leased instances in count index order
    pub values: Vec<ElementSlot>,
}

impl GlobalPropertyStruct {
    /// Whether every instance is leased
    pub fn is_exhausted(&self) -> bool {
        self.values.len() >= self.max_count
    }
}

/// Live handle to one leased instance of a global property
///
/// Writes go straight into the instance data buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalValue {
    /// Property the value belongs to
    pub semantic: ShaderSemantic,
    /// Count index of the lease
    pub count_index: usize,
    /// Array entry addressed by `read`/`write`
    pub array_index: usize,
    /// Backing element
    pub slot: ElementSlot,
}

impl GlobalValue {
    /// Write the addressed entry
    pub fn write(&self, memory: &mut MemoryManager, value: &PropertyValue) -> MemoryResult<()> {
        match value {
            PropertyValue::Array(..) => memory.write_value(self.slot, value),
            other => memory.write_value_at(self.slot, self.array_index, other),
        }
    }

    /// Write another entry of the same lease
    pub fn write_at(
        &self,
        memory: &mut MemoryManager,
        array_index: usize,
        value: &PropertyValue,
    ) -> MemoryResult<()> {
        memory.write_value_at(self.slot, array_index, value)
    }

    /// Read the addressed entry
    pub fn read(&self, memory: &MemoryManager) -> MemoryResult<PropertyValue> {
        memory.read_value_at(self.slot, self.array_index)
    }
}
