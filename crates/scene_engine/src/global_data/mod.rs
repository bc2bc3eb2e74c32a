//! # Global shader data
//!
//! Properties that no single component owns but every shader may read:
//! camera matrices, light arrays, skinning matrices, the current component
//! SIDs. They live in the instance data buffer next to component members and
//! are addressed with the same vec4 arithmetic.

pub mod property;
pub mod repository;
pub mod semantic;

pub use property::{GlobalPropertyStruct, GlobalValue};
pub use repository::GlobalDataRepository;
pub use semantic::{ShaderSemantic, ShaderSemanticsInfo, ShaderStage};

use crate::memory::MemoryError;

/// Global data errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GlobalDataError {
    /// Semantic was never registered
    #[error("unregistered shader semantic: {0}")]
    Unregistered(String),

    /// Every count slot of the property is leased
    #[error("all {max_count} instances of {semantic} are leased")]
    LeaseCapacityExceeded {
        /// Property semantic
        semantic: String,
        /// Configured maximum
        max_count: usize,
    },

    /// Array entry past the property's array length
    #[error("{semantic}: array index {index} out of range (length {length})")]
    IndexOutOfRange {
        /// Property semantic
        semantic: String,
        /// Requested entry
        index: usize,
        /// Entries per instance
        length: usize,
    },

    /// Backing memory could not be allocated or written
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Result type for global data operations
pub type GlobalDataResult<T> = Result<T, GlobalDataError>;
