//! Fixed-capacity backing store for one usage class

use serde::{Deserialize, Serialize};

use super::accessor::{Accessor, AccessorDesc, AccessorHandle};
use super::buffer_view::{BufferView, BufferViewDesc, BufferViewHandle};
use super::composition::aligned_byte_length;
use super::{MemoryError, MemoryResult};
use crate::foundation::math::utils::align_up;

/// Usage class of a shared buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BufferUse {
    /// Data only the CPU reads
    CpuGeneric,
    /// Per-instance data mirrored to the GPU every frame
    GpuInstanceData,
    /// Vertex attributes and morph targets
    GpuVertexData,
    /// Uniform-block staging
    UboGeneric,
}

impl BufferUse {
    /// Every usage class, in buffer index order
    pub const ALL: [Self; 4] = [
        Self::CpuGeneric,
        Self::GpuInstanceData,
        Self::GpuVertexData,
        Self::UboGeneric,
    ];

    /// Position in [`Self::ALL`]
    pub const fn index(self) -> usize {
        match self {
            Self::CpuGeneric => 0,
            Self::GpuInstanceData => 1,
            Self::GpuVertexData => 2,
            Self::UboGeneric => 3,
        }
    }

    /// Minimum start alignment for views and accessors
    ///
    /// Instance data is addressed in vec4 units by generated shaders, so
    /// everything inside it starts on a 16-byte boundary.
    pub const fn min_alignment(self) -> usize {
        match self {
            Self::GpuInstanceData | Self::UboGeneric => 16,
            Self::CpuGeneric | Self::GpuVertexData => 4,
        }
    }
}

/// One contiguous, fixed-capacity region of 32-bit words
///
/// The word storage grows as views are carved but never past the capacity
/// given at construction. Every write bumps `version`, which the strategies
/// compare against to skip redundant uploads.
#[derive(Debug, Clone)]
pub struct Buffer {
    usage: BufferUse,
    byte_capacity: usize,
    words: Vec<f32>,
    taken_byte_index: usize,
    version: u64,
    views: Vec<BufferView>,
    accessors: Vec<Accessor>,
}

impl Buffer {
    /// Create an empty buffer
    pub const fn new(usage: BufferUse, byte_capacity: usize) -> Self {
        Self {
            usage,
            byte_capacity,
            words: Vec::new(),
            taken_byte_index: 0,
            version: 0,
            views: Vec::new(),
            accessors: Vec::new(),
        }
    }

    /// Usage class
    pub const fn usage(&self) -> BufferUse {
        self.usage
    }

    /// Fixed capacity in bytes
    pub const fn byte_capacity(&self) -> usize {
        self.byte_capacity
    }

    /// Bytes handed out to views so far
    pub const fn taken_byte_index(&self) -> usize {
        self.taken_byte_index
    }

    /// Monotonic write counter
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Words backing every taken view
    pub fn as_words(&self) -> &[f32] {
        &self.words
    }

    /// Bytes backing every taken view
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    /// Carve a new view out of the unused tail of the buffer
    ///
    /// The start is aligned to `max(desc.byte_align, usage alignment)`.
    /// Running past the capacity logs a warning and returns
    /// [`MemoryError::CapacityExceeded`]; nothing is taken in that case.
    pub fn take_buffer_view(&mut self, desc: BufferViewDesc) -> MemoryResult<BufferViewHandle> {
        let align = desc.byte_align.max(self.usage.min_alignment());
        let start = align_up(self.taken_byte_index, align);
        let byte_length = align_up(desc.byte_length, 4);
        let end = start + byte_length;

        if end > self.byte_capacity {
            let available = self.byte_capacity.saturating_sub(self.taken_byte_index);
            log::warn!(
                "{:?} buffer cannot fit a {} byte view ({} of {} bytes free)",
                self.usage,
                desc.byte_length,
                available,
                self.byte_capacity
            );
            return Err(MemoryError::CapacityExceeded {
                usage: self.usage,
                requested: end - self.taken_byte_index,
                available,
            });
        }

        let handle = BufferViewHandle {
            usage: self.usage,
            index: self.views.len() as u32,
        };
        self.views.push(BufferView::new(handle, start, byte_length, &desc));
        self.taken_byte_index = end;
        self.words.resize(end / 4, 0.0);

        log::debug!(
            "{:?}: view {} at byte {} ({} bytes)",
            self.usage,
            handle.index,
            start,
            byte_length
        );
        Ok(handle)
    }

    /// Look up a view
    pub fn view(&self, handle: BufferViewHandle) -> MemoryResult<&BufferView> {
        self.views
            .get(handle.index as usize)
            .filter(|_| handle.usage == self.usage)
            .ok_or(MemoryError::UnknownHandle {
                kind: "buffer view",
                usage: handle.usage,
                index: handle.index,
            })
    }

    /// All views in creation order
    pub fn views(&self) -> &[BufferView] {
        &self.views
    }

    /// Take an accessor with the buffer's natural element stride
    ///
    /// Instance data accessors use the 16-byte aligned per-instance length so
    /// element `i` sits at a whole vec4 offset.
    pub fn take_accessor(
        &mut self,
        view: BufferViewHandle,
        desc: AccessorDesc,
    ) -> MemoryResult<AccessorHandle> {
        let stride = if self.usage.min_alignment() == 16 {
            aligned_byte_length(desc.composition_type, desc.array_length)
        } else {
            desc.packed_element_byte_length()
        };
        self.take_accessor_with_stride(view, desc, stride)
    }

    /// Take an accessor with an explicit element stride
    pub fn take_flexible_accessor(
        &mut self,
        view: BufferViewHandle,
        desc: AccessorDesc,
        byte_stride: usize,
    ) -> MemoryResult<AccessorHandle> {
        let element_size = desc.packed_element_byte_length();
        if byte_stride < element_size {
            return Err(MemoryError::InvalidStride {
                stride: byte_stride,
                element_size,
            });
        }
        self.take_accessor_with_stride(view, desc, byte_stride)
    }

    fn take_accessor_with_stride(
        &mut self,
        view_handle: BufferViewHandle,
        desc: AccessorDesc,
        byte_stride: usize,
    ) -> MemoryResult<AccessorHandle> {
        let align = self.usage.min_alignment();
        let usage = self.usage;
        let view = self
            .views
            .get_mut(view_handle.index as usize)
            .filter(|_| view_handle.usage == usage)
            .ok_or(MemoryError::UnknownHandle {
                kind: "buffer view",
                usage: view_handle.usage,
                index: view_handle.index,
            })?;

        let byte_length = byte_stride * desc.count;
        let offset_in_view = view.carve(byte_length, align, usage)?;
        let handle = AccessorHandle {
            usage,
            index: self.accessors.len() as u32,
        };
        view.push_accessor(handle);
        let byte_offset_in_buffer = view.byte_offset_in_buffer() + offset_in_view;
        self.accessors.push(Accessor::new(
            handle,
            view_handle,
            &desc,
            byte_stride,
            offset_in_view,
            byte_offset_in_buffer,
        ));
        Ok(handle)
    }

    /// Look up an accessor
    pub fn accessor(&self, handle: AccessorHandle) -> MemoryResult<&Accessor> {
        self.accessors
            .get(handle.index as usize)
            .filter(|_| handle.usage == self.usage)
            .ok_or(MemoryError::UnknownHandle {
                kind: "accessor",
                usage: handle.usage,
                index: handle.index,
            })
    }

    pub(super) fn accessor_mut(&mut self, handle: AccessorHandle) -> MemoryResult<&mut Accessor> {
        let usage = self.usage;
        self.accessors
            .get_mut(handle.index as usize)
            .filter(|_| handle.usage == usage)
            .ok_or(MemoryError::UnknownHandle {
                kind: "accessor",
                usage: handle.usage,
                index: handle.index,
            })
    }

    /// Read `len` words starting at a byte offset
    pub fn read_words(&self, byte_offset: usize, len: usize) -> MemoryResult<&[f32]> {
        let start = byte_offset / 4;
        self.words
            .get(start..start + len)
            .ok_or(MemoryError::IndexOutOfRange {
                index: start + len,
                length: self.words.len(),
            })
    }

    /// Overwrite words starting at a byte offset and bump the version
    pub fn write_words(&mut self, byte_offset: usize, values: &[f32]) -> MemoryResult<()> {
        let start = byte_offset / 4;
        let length = self.words.len();
        let target = self
            .words
            .get_mut(start..start + values.len())
            .ok_or(MemoryError::IndexOutOfRange {
                index: start + values.len(),
                length,
            })?;
        target.copy_from_slice(values);
        self.version += 1;
        Ok(())
    }

    pub(super) fn write_element(
        &mut self,
        accessor: AccessorHandle,
        index: u32,
        array_index: usize,
        values: &[f32],
    ) -> MemoryResult<()> {
        let acc = self.accessor(accessor)?;
        let expected = acc.composition_type().number_of_components();
        if values.len() != expected {
            return Err(MemoryError::ValueSizeMismatch {
                expected,
                actual: values.len(),
            });
        }
        let byte_offset = acc.element_byte_offset(index, array_index)?;
        self.write_words(byte_offset, values)?;
        self.accessor_mut(accessor)?.bump_version();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::composition::CompositionType;

    #[test]
    fn test_views_do_not_overlap() {
        let mut buffer = Buffer::new(BufferUse::CpuGeneric, 256);
        let a = buffer
            .take_buffer_view(BufferViewDesc::new(12))
            .unwrap();
        let b = buffer
            .take_buffer_view(BufferViewDesc::new(20))
            .unwrap();
        let va = buffer.view(a).unwrap();
        let vb = buffer.view(b).unwrap();
        assert!(va.byte_offset_in_buffer() + va.byte_length() <= vb.byte_offset_in_buffer());
        assert_eq!(buffer.taken_byte_index(), 32);
    }

    #[test]
    fn test_instance_data_views_are_16_aligned() {
        let mut buffer = Buffer::new(BufferUse::GpuInstanceData, 1024);
        buffer.take_buffer_view(BufferViewDesc::new(4)).unwrap();
        let second = buffer.take_buffer_view(BufferViewDesc::new(4)).unwrap();
        assert_eq!(buffer.view(second).unwrap().byte_offset_in_buffer(), 16);
    }

    #[test]
    fn test_capacity_exceeded_is_reported() {
        let mut buffer = Buffer::new(BufferUse::GpuVertexData, 64);
        buffer.take_buffer_view(BufferViewDesc::new(48)).unwrap();
        let result = buffer.take_buffer_view(BufferViewDesc::new(32));
        assert_eq!(
            result,
            Err(MemoryError::CapacityExceeded {
                usage: BufferUse::GpuVertexData,
                requested: 32,
                available: 16,
            })
        );
        // failed request took nothing
        assert_eq!(buffer.taken_byte_index(), 48);
    }

    #[test]
    fn test_write_bumps_version() {
        let mut buffer = Buffer::new(BufferUse::CpuGeneric, 64);
        let view = buffer.take_buffer_view(BufferViewDesc::new(64)).unwrap();
        let acc = buffer
            .take_accessor(view, AccessorDesc::new(CompositionType::Vec3, 2))
            .unwrap();
        let before = buffer.version();
        buffer.write_element(acc, 1, 0, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(buffer.version(), before + 1);
        assert_eq!(buffer.read_words(12, 3).unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_flexible_stride_must_cover_element() {
        let mut buffer = Buffer::new(BufferUse::CpuGeneric, 256);
        let view = buffer.take_buffer_view(BufferViewDesc::new(256)).unwrap();
        let result =
            buffer.take_flexible_accessor(view, AccessorDesc::new(CompositionType::Mat4, 1), 32);
        assert!(matches!(result, Err(MemoryError::InvalidStride { .. })));
    }
}
