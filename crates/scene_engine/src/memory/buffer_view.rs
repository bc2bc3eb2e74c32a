//! Sub-ranges of a buffer

use super::accessor::AccessorHandle;
use super::buffer::BufferUse;
use super::{MemoryError, MemoryResult};
use crate::foundation::math::utils::align_up;

/// Handle to a view inside one of the shared buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferViewHandle {
    /// Buffer that owns the view
    pub usage: BufferUse,
    /// Creation index within that buffer
    pub index: u32,
}

/// Request for a new buffer view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferViewDesc {
    /// Bytes the view needs
    pub byte_length: usize,
    /// Stride hint for interleaved views, 0 when tightly packed
    pub byte_stride: usize,
    /// Minimum start alignment
    pub byte_align: usize,
    /// Whether the view interleaves structures (array of structures)
    pub is_aos: bool,
}

impl BufferViewDesc {
    /// Tightly packed, 4-byte aligned view of `byte_length` bytes
    pub const fn new(byte_length: usize) -> Self {
        Self {
            byte_length,
            byte_stride: 0,
            byte_align: 4,
            is_aos: false,
        }
    }

    /// Override the start alignment
    pub const fn with_align(mut self, byte_align: usize) -> Self {
        self.byte_align = byte_align;
        self
    }

    /// Mark the view as interleaved with the given stride
    pub const fn interleaved(mut self, byte_stride: usize) -> Self {
        self.byte_stride = byte_stride;
        self.is_aos = true;
        self
    }
}

/// Non-overlapping byte range of a buffer that accessors are carved from
#[derive(Debug, Clone)]
pub struct BufferView {
    handle: BufferViewHandle,
    byte_offset_in_buffer: usize,
    byte_length: usize,
    byte_stride: usize,
    is_aos: bool,
    taken_byte_index: usize,
    accessors: Vec<AccessorHandle>,
}

impl BufferView {
    pub(super) fn new(
        handle: BufferViewHandle,
        byte_offset_in_buffer: usize,
        byte_length: usize,
        desc: &BufferViewDesc,
    ) -> Self {
        Self {
            handle,
            byte_offset_in_buffer,
            byte_length,
            byte_stride: desc.byte_stride,
            is_aos: desc.is_aos,
            taken_byte_index: 0,
            accessors: Vec::new(),
        }
    }

    /// Handle of this view
    pub const fn handle(&self) -> BufferViewHandle {
        self.handle
    }

    /// Start of the view in its buffer
    pub const fn byte_offset_in_buffer(&self) -> usize {
        self.byte_offset_in_buffer
    }

    /// Length of the view
    pub const fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Interleave stride, 0 when tightly packed
    pub const fn byte_stride(&self) -> usize {
        self.byte_stride
    }

    /// Whether the view interleaves structures
    pub const fn is_aos(&self) -> bool {
        self.is_aos
    }

    /// Bytes already handed to accessors
    pub const fn taken_byte_index(&self) -> usize {
        self.taken_byte_index
    }

    /// Accessors taken from this view
    pub fn accessors(&self) -> &[AccessorHandle] {
        &self.accessors
    }

    /// Reserve `byte_length` bytes, returning their offset inside the view
    pub(super) fn carve(
        &mut self,
        byte_length: usize,
        align: usize,
        usage: BufferUse,
    ) -> MemoryResult<usize> {
        let start = align_up(self.taken_byte_index, align);
        if start + byte_length > self.byte_length {
            let available = self.byte_length.saturating_sub(self.taken_byte_index);
            log::warn!(
                "{:?} view {} cannot fit a {} byte accessor ({} bytes free)",
                usage,
                self.handle.index,
                byte_length,
                available
            );
            return Err(MemoryError::CapacityExceeded {
                usage,
                requested: start + byte_length - self.taken_byte_index,
                available,
            });
        }
        self.taken_byte_index = start + byte_length;
        Ok(start)
    }

    pub(super) fn push_accessor(&mut self, handle: AccessorHandle) {
        self.accessors.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carve_is_sequential_and_bounded() {
        let handle = BufferViewHandle {
            usage: BufferUse::CpuGeneric,
            index: 0,
        };
        let mut view = BufferView::new(handle, 64, 32, &BufferViewDesc::new(32));
        assert_eq!(view.carve(12, 4, BufferUse::CpuGeneric), Ok(0));
        assert_eq!(view.carve(8, 16, BufferUse::CpuGeneric), Ok(16));
        assert!(view.carve(16, 4, BufferUse::CpuGeneric).is_err());
        assert_eq!(view.taken_byte_index(), 24);
    }
}
