//! Typed, strided element views over a buffer

use super::buffer::BufferUse;
use super::buffer_view::BufferViewHandle;
use super::composition::{ComponentType, CompositionType};
use super::{MemoryError, MemoryResult};

/// Handle to an accessor inside one of the shared buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessorHandle {
    /// Buffer that owns the accessor
    pub usage: BufferUse,
    /// Creation index within that buffer
    pub index: u32,
}

/// One leased accessor element
///
/// Writes through a slot (see [`MemoryManager::write_slot`]) land directly in
/// the backing buffer.
///
/// [`MemoryManager::write_slot`]: super::MemoryManager::write_slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementSlot {
    /// Accessor the element belongs to
    pub accessor: AccessorHandle,
    /// Element index
    pub index: u32,
}

/// Request for a new accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessorDesc {
    /// Element shape
    pub composition_type: CompositionType,
    /// Scalar type
    pub component_type: ComponentType,
    /// Number of elements
    pub count: usize,
    /// Entries per element for array compositions, 1 otherwise
    pub array_length: usize,
}

impl AccessorDesc {
    /// Float accessor of `count` elements
    pub const fn new(composition_type: CompositionType, count: usize) -> Self {
        Self {
            composition_type,
            component_type: ComponentType::Float,
            count,
            array_length: 1,
        }
    }

    /// Set the scalar type
    pub const fn with_component_type(mut self, component_type: ComponentType) -> Self {
        self.component_type = component_type;
        self
    }

    /// Set entries per element (array compositions only)
    pub const fn with_array_length(mut self, array_length: usize) -> Self {
        self.array_length = if self.composition_type.is_array() {
            array_length
        } else {
            1
        };
        self
    }

    /// Bytes of one element when nothing is padded
    pub const fn packed_element_byte_length(&self) -> usize {
        if self.composition_type.is_array() {
            self.composition_type.array_entry_stride() * self.array_length.saturating_sub(1)
                + self.composition_type.number_of_components() * 4
        } else {
            self.composition_type.number_of_components() * 4
        }
    }
}

/// Typed, strided run of elements inside a buffer view
///
/// Element `i`, entry `j` lives at
/// `byte_offset_in_buffer + i * byte_stride + j * array_entry_stride`.
#[derive(Debug, Clone)]
pub struct Accessor {
    handle: AccessorHandle,
    view: BufferViewHandle,
    composition_type: CompositionType,
    component_type: ComponentType,
    count: usize,
    array_length: usize,
    byte_stride: usize,
    byte_offset_in_view: usize,
    byte_offset_in_buffer: usize,
    taken_count: usize,
    version: u64,
}

impl Accessor {
    pub(super) fn new(
        handle: AccessorHandle,
        view: BufferViewHandle,
        desc: &AccessorDesc,
        byte_stride: usize,
        byte_offset_in_view: usize,
        byte_offset_in_buffer: usize,
    ) -> Self {
        Self {
            handle,
            view,
            composition_type: desc.composition_type,
            component_type: desc.component_type,
            count: desc.count,
            array_length: desc.array_length,
            byte_stride,
            byte_offset_in_view,
            byte_offset_in_buffer,
            taken_count: 0,
            version: 0,
        }
    }

    /// Handle of this accessor
    pub const fn handle(&self) -> AccessorHandle {
        self.handle
    }

    /// View the accessor was carved from
    pub const fn view(&self) -> BufferViewHandle {
        self.view
    }

    /// Element shape
    pub const fn composition_type(&self) -> CompositionType {
        self.composition_type
    }

    /// Scalar type
    pub const fn component_type(&self) -> ComponentType {
        self.component_type
    }

    /// Number of elements
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Entries per element
    pub const fn array_length(&self) -> usize {
        self.array_length
    }

    /// Bytes between consecutive elements
    pub const fn byte_stride(&self) -> usize {
        self.byte_stride
    }

    /// Start inside the view
    pub const fn byte_offset_in_view(&self) -> usize {
        self.byte_offset_in_view
    }

    /// Start inside the buffer
    pub const fn byte_offset_in_buffer(&self) -> usize {
        self.byte_offset_in_buffer
    }

    /// Total bytes covered
    pub const fn byte_length(&self) -> usize {
        self.byte_stride * self.count
    }

    /// Elements leased so far
    pub const fn taken_count(&self) -> usize {
        self.taken_count
    }

    /// Write counter of this accessor
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Byte offset of entry `array_index` of element `index`
    pub fn element_byte_offset(&self, index: u32, array_index: usize) -> MemoryResult<usize> {
        let index = index as usize;
        if index >= self.count {
            return Err(MemoryError::IndexOutOfRange {
                index,
                length: self.count,
            });
        }
        if array_index >= self.array_length {
            return Err(MemoryError::IndexOutOfRange {
                index: array_index,
                length: self.array_length,
            });
        }
        Ok(self.byte_offset_in_buffer
            + index * self.byte_stride
            + array_index * self.composition_type.array_entry_stride())
    }

    pub(super) fn take_one(&mut self) -> MemoryResult<u32> {
        if self.taken_count >= self.count {
            return Err(MemoryError::AccessorExhausted { count: self.count });
        }
        let index = self.taken_count;
        self.taken_count += 1;
        Ok(index as u32)
    }

    pub(super) fn take_existing(&mut self, index: u32) -> MemoryResult<u32> {
        let i = index as usize;
        if i >= self.count {
            return Err(MemoryError::IndexOutOfRange {
                index: i,
                length: self.count,
            });
        }
        self.taken_count = self.taken_count.max(i + 1);
        Ok(index)
    }

    pub(super) fn bump_version(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accessor(desc: AccessorDesc, stride: usize, offset: usize) -> Accessor {
        let view = BufferViewHandle {
            usage: BufferUse::GpuInstanceData,
            index: 0,
        };
        let handle = AccessorHandle {
            usage: BufferUse::GpuInstanceData,
            index: 0,
        };
        Accessor::new(handle, view, &desc, stride, 0, offset)
    }

    #[test]
    fn test_element_offsets() {
        let acc = accessor(AccessorDesc::new(CompositionType::Mat3, 4), 48, 32);
        assert_eq!(acc.element_byte_offset(0, 0), Ok(32));
        assert_eq!(acc.element_byte_offset(2, 0), Ok(128));
        assert!(acc.element_byte_offset(4, 0).is_err());
    }

    #[test]
    fn test_array_entry_offsets() {
        let desc = AccessorDesc::new(CompositionType::Vec3Array, 2).with_array_length(4);
        let acc = accessor(desc, 48, 0);
        assert_eq!(acc.element_byte_offset(1, 3), Ok(48 + 36));
        assert!(acc.element_byte_offset(1, 4).is_err());
    }

    #[test]
    fn test_take_one_until_exhausted() {
        let mut acc = accessor(AccessorDesc::new(CompositionType::Vec4, 2), 16, 0);
        assert_eq!(acc.take_one(), Ok(0));
        assert_eq!(acc.take_one(), Ok(1));
        assert_eq!(acc.take_one(), Err(MemoryError::AccessorExhausted { count: 2 }));
    }

    #[test]
    fn test_packed_element_length() {
        let desc = AccessorDesc::new(CompositionType::Mat3Array, 1).with_array_length(2);
        assert_eq!(desc.packed_element_byte_length(), 48 + 36);
        let scalar = AccessorDesc::new(CompositionType::Scalar, 1).with_array_length(9);
        assert_eq!(scalar.array_length, 1);
    }
}
