//! # Component memory
//!
//! Flat, fixed-capacity buffers that hold every per-component and per-semantic
//! number the engine uploads to the GPU.
//!
//! ## Structure
//!
//! ```text
//! MemoryManager
//!  ├── Buffer (one per BufferUse)
//!  │    ├── BufferView  (non-overlapping byte ranges)
//!  │    └── Accessor    (typed, strided elements inside a view)
//!  └── ElementSlot      (one leased element, written in place)
//! ```
//!
//! All handles are small `Copy` values resolved through the [`MemoryManager`].
//! Writing through a slot mutates the buffer directly, so the next GPU upload
//! sees the value without any copy step.
//!
//! [`ComponentMemoryRegistry`] records which accessor and byte offset every
//! component member got, and [`PropertyLayout`]/[`PropertyLocation`] turn those
//! offsets into the vec4/scalar addresses shared by the CPU writer and the
//! generated shader code.

pub mod accessor;
pub mod buffer;
pub mod buffer_view;
pub mod composition;
pub mod layout;
pub mod manager;
pub mod registry;
pub mod value;

pub use accessor::{Accessor, AccessorDesc, AccessorHandle, ElementSlot};
pub use buffer::{Buffer, BufferUse};
pub use buffer_view::{BufferView, BufferViewDesc, BufferViewHandle};
pub use composition::{aligned_byte_length, ComponentType, CompositionType};
pub use layout::{LocationChunk, PropertyLayout, PropertyLocation};
pub use manager::MemoryManager;
pub use registry::{ComponentMemoryRegistry, MemberDescriptor, MemberKey};
pub use value::PropertyValue;

/// Memory subsystem errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// A buffer or buffer view has no room for the requested range
    #[error("{usage:?} capacity exceeded: requested {requested} bytes, {available} available")]
    CapacityExceeded {
        /// Buffer the request was made against
        usage: BufferUse,
        /// Bytes requested (including alignment padding)
        requested: usize,
        /// Bytes still free
        available: usize,
    },

    /// Every element of an accessor is already leased
    #[error("accessor exhausted: all {count} elements are taken")]
    AccessorExhausted {
        /// Element count of the accessor
        count: usize,
    },

    /// A handle does not refer to a live view or accessor
    #[error("unknown {kind} handle {index} in {usage:?}")]
    UnknownHandle {
        /// "buffer view" or "accessor"
        kind: &'static str,
        /// Buffer the handle points into
        usage: BufferUse,
        /// Index carried by the handle
        index: u32,
    },

    /// Element or array index past the end
    #[error("index {index} out of range (length {length})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Valid length
        length: usize,
    },

    /// Value does not have the number of floats the element expects
    #[error("value size mismatch: expected {expected} floats, got {actual}")]
    ValueSizeMismatch {
        /// Floats per element
        expected: usize,
        /// Floats supplied
        actual: usize,
    },

    /// Explicit stride is smaller than one element
    #[error("stride {stride} is smaller than the element size {element_size}")]
    InvalidStride {
        /// Requested stride in bytes
        stride: usize,
        /// Minimum element size in bytes
        element_size: usize,
    },
}

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;
