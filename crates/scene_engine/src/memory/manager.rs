//! Owner of the four shared buffers

use super::accessor::{Accessor, AccessorDesc, AccessorHandle, ElementSlot};
use super::buffer::{Buffer, BufferUse};
use super::buffer_view::{BufferView, BufferViewDesc, BufferViewHandle};
use super::composition::CompositionType;
use super::value::PropertyValue;
use super::{MemoryError, MemoryResult};
use crate::core::BufferCapacities;

/// Owns one [`Buffer`] per [`BufferUse`] and resolves every memory handle
#[derive(Debug, Clone)]
pub struct MemoryManager {
    buffers: [Buffer; 4],
}

impl MemoryManager {
    /// Create the buffers with the configured capacities
    pub fn new(capacities: &BufferCapacities) -> Self {
        let buffers = BufferUse::ALL.map(|usage| Buffer::new(usage, capacities.capacity_of(usage)));
        log::debug!(
            "Memory buffers: cpu {} B, instance {} B, vertex {} B, ubo {} B",
            capacities.cpu_generic,
            capacities.gpu_instance_data,
            capacities.gpu_vertex_data,
            capacities.ubo_generic
        );
        Self { buffers }
    }

    /// Buffer for a usage class
    pub const fn buffer(&self, usage: BufferUse) -> &Buffer {
        &self.buffers[usage.index()]
    }

    fn buffer_mut(&mut self, usage: BufferUse) -> &mut Buffer {
        &mut self.buffers[usage.index()]
    }

    /// Write counter of a buffer
    pub const fn version(&self, usage: BufferUse) -> u64 {
        self.buffer(usage).version()
    }

    /// Carve a view out of a buffer
    pub fn take_buffer_view(
        &mut self,
        usage: BufferUse,
        desc: BufferViewDesc,
    ) -> MemoryResult<BufferViewHandle> {
        self.buffer_mut(usage).take_buffer_view(desc)
    }

    /// Take an accessor with the buffer's natural stride
    pub fn take_accessor(
        &mut self,
        view: BufferViewHandle,
        desc: AccessorDesc,
    ) -> MemoryResult<AccessorHandle> {
        self.buffer_mut(view.usage).take_accessor(view, desc)
    }

    /// Take an accessor with an explicit stride
    pub fn take_flexible_accessor(
        &mut self,
        view: BufferViewHandle,
        desc: AccessorDesc,
        byte_stride: usize,
    ) -> MemoryResult<AccessorHandle> {
        self.buffer_mut(view.usage)
            .take_flexible_accessor(view, desc, byte_stride)
    }

    /// Resolve a view handle
    pub fn view(&self, handle: BufferViewHandle) -> MemoryResult<&BufferView> {
        self.buffer(handle.usage).view(handle)
    }

    /// Resolve an accessor handle
    pub fn accessor(&self, handle: AccessorHandle) -> MemoryResult<&Accessor> {
        self.buffer(handle.usage).accessor(handle)
    }

    /// Lease the next unused element of an accessor
    pub fn take_one(&mut self, accessor: AccessorHandle) -> MemoryResult<ElementSlot> {
        let index = self.buffer_mut(accessor.usage).accessor_mut(accessor)?.take_one()?;
        Ok(ElementSlot { accessor, index })
    }

    /// Re-lease a specific element (slot reuse)
    pub fn take_existing(
        &mut self,
        accessor: AccessorHandle,
        index: u32,
    ) -> MemoryResult<ElementSlot> {
        let index = self
            .buffer_mut(accessor.usage)
            .accessor_mut(accessor)?
            .take_existing(index)?;
        Ok(ElementSlot { accessor, index })
    }

    /// Byte offset of a slot's first entry in its buffer
    pub fn slot_byte_offset(&self, slot: ElementSlot) -> MemoryResult<usize> {
        self.accessor(slot.accessor)?.element_byte_offset(slot.index, 0)
    }

    /// Floats of one entry of a slot
    pub fn read_entry(&self, slot: ElementSlot, array_index: usize) -> MemoryResult<&[f32]> {
        let buffer = self.buffer(slot.accessor.usage);
        let accessor = buffer.accessor(slot.accessor)?;
        let offset = accessor.element_byte_offset(slot.index, array_index)?;
        buffer.read_words(offset, accessor.composition_type().number_of_components())
    }

    /// Overwrite one entry of a slot
    pub fn write_entry(
        &mut self,
        slot: ElementSlot,
        array_index: usize,
        values: &[f32],
    ) -> MemoryResult<()> {
        self.buffer_mut(slot.accessor.usage)
            .write_element(slot.accessor, slot.index, array_index, values)
    }

    /// Floats of a non-array slot
    pub fn read_slot(&self, slot: ElementSlot) -> MemoryResult<&[f32]> {
        self.read_entry(slot, 0)
    }

    /// Overwrite a non-array slot
    pub fn write_slot(&mut self, slot: ElementSlot, values: &[f32]) -> MemoryResult<()> {
        self.write_entry(slot, 0, values)
    }

    /// Read a slot as a typed value; arrays come back whole
    pub fn read_value(&self, slot: ElementSlot) -> MemoryResult<PropertyValue> {
        let accessor = self.accessor(slot.accessor)?;
        let composition = accessor.composition_type();
        let mismatch = || MemoryError::ValueSizeMismatch {
            expected: composition.number_of_components(),
            actual: 0,
        };
        if composition.is_array() {
            let entries = (0..accessor.array_length())
                .map(|i| {
                    let floats = self.read_entry(slot, i)?;
                    PropertyValue::from_floats(composition, floats).ok_or_else(mismatch)
                })
                .collect::<MemoryResult<Vec<_>>>()?;
            Ok(PropertyValue::Array(composition, entries))
        } else {
            PropertyValue::from_floats(composition, self.read_slot(slot)?).ok_or_else(mismatch)
        }
    }

    /// Write a typed value to a slot
    ///
    /// Array values write their entries starting at entry 0; a non-array value
    /// aimed at an array accessor writes entry 0 only.
    pub fn write_value(&mut self, slot: ElementSlot, value: &PropertyValue) -> MemoryResult<()> {
        match value {
            PropertyValue::Array(_, entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    self.write_entry(slot, i, &entry.to_floats())?;
                }
                Ok(())
            }
            other => self.write_entry(slot, 0, &other.to_floats()),
        }
    }

    /// Write one array entry as a typed value
    pub fn write_value_at(
        &mut self,
        slot: ElementSlot,
        array_index: usize,
        value: &PropertyValue,
    ) -> MemoryResult<()> {
        self.write_entry(slot, array_index, &value.to_floats())
    }

    /// Overwrite consecutive elements of a non-array accessor from element 0
    ///
    /// `values` holds whole elements back to back; a trailing partial element
    /// is a size mismatch.
    pub fn write_elements(&mut self, accessor: AccessorHandle, values: &[f32]) -> MemoryResult<()> {
        let components = self.accessor(accessor)?.composition_type().number_of_components();
        if values.len() % components != 0 {
            return Err(MemoryError::ValueSizeMismatch {
                expected: components,
                actual: values.len() % components,
            });
        }
        for (index, element) in values.chunks_exact(components).enumerate() {
            let slot = ElementSlot {
                accessor,
                index: index as u32,
            };
            self.write_slot(slot, element)?;
        }
        Ok(())
    }

    /// Floats of the first `count` elements of a non-array accessor
    pub fn read_elements(&self, accessor: AccessorHandle, count: usize) -> MemoryResult<Vec<f32>> {
        let mut floats = Vec::new();
        for index in 0..count {
            let slot = ElementSlot {
                accessor,
                index: index as u32,
            };
            floats.extend_from_slice(self.read_slot(slot)?);
        }
        Ok(floats)
    }

    /// Read one array entry as a typed value
    pub fn read_value_at(
        &self,
        slot: ElementSlot,
        array_index: usize,
    ) -> MemoryResult<PropertyValue> {
        let composition: CompositionType = self.accessor(slot.accessor)?.composition_type();
        let floats = self.read_entry(slot, array_index)?;
        PropertyValue::from_floats(composition, floats).ok_or(MemoryError::ValueSizeMismatch {
            expected: composition.number_of_components(),
            actual: floats.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec3};

    fn manager() -> MemoryManager {
        MemoryManager::new(&BufferCapacities {
            cpu_generic: 1024,
            gpu_instance_data: 1024,
            gpu_vertex_data: 1024,
            ubo_generic: 256,
        })
    }

    #[test]
    fn test_write_through_slot_is_visible_in_buffer() {
        let mut memory = manager();
        let view = memory
            .take_buffer_view(BufferUse::GpuInstanceData, BufferViewDesc::new(128))
            .unwrap();
        let accessor = memory
            .take_accessor(view, AccessorDesc::new(CompositionType::Mat4, 2))
            .unwrap();
        let first = memory.take_one(accessor).unwrap();
        let second = memory.take_one(accessor).unwrap();
        assert_eq!(second.index, 1);

        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        memory.write_value(first, &PropertyValue::Mat4(m)).unwrap();

        let words = memory.buffer(BufferUse::GpuInstanceData).as_words();
        assert_eq!(&words[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(memory.read_value(first).unwrap(), PropertyValue::Mat4(m));
        assert_eq!(memory.slot_byte_offset(second).unwrap(), 64);
    }

    #[test]
    fn test_array_value_round_trip() {
        let mut memory = manager();
        let view = memory
            .take_buffer_view(BufferUse::CpuGeneric, BufferViewDesc::new(64))
            .unwrap();
        let accessor = memory
            .take_accessor(
                view,
                AccessorDesc::new(CompositionType::Vec3Array, 1).with_array_length(2),
            )
            .unwrap();
        let slot = memory.take_one(accessor).unwrap();
        let value = PropertyValue::Array(
            CompositionType::Vec3Array,
            vec![
                PropertyValue::Vec3(Vec3::new(1.0, 2.0, 3.0)),
                PropertyValue::Vec3(Vec3::new(4.0, 5.0, 6.0)),
            ],
        );
        memory.write_value(slot, &value).unwrap();
        assert_eq!(memory.read_value(slot).unwrap(), value);
        assert_eq!(
            memory.read_value_at(slot, 1).unwrap(),
            PropertyValue::Vec3(Vec3::new(4.0, 5.0, 6.0))
        );
    }

    #[test]
    fn test_wrong_size_write_rejected() {
        let mut memory = manager();
        let view = memory
            .take_buffer_view(BufferUse::CpuGeneric, BufferViewDesc::new(16))
            .unwrap();
        let accessor = memory
            .take_accessor(view, AccessorDesc::new(CompositionType::Vec4, 1))
            .unwrap();
        let slot = memory.take_one(accessor).unwrap();
        assert_eq!(
            memory.write_slot(slot, &[1.0]),
            Err(MemoryError::ValueSizeMismatch {
                expected: 4,
                actual: 1
            })
        );
    }

    #[test]
    fn test_handle_from_other_buffer_rejected() {
        let mut memory = manager();
        let view = memory
            .take_buffer_view(BufferUse::CpuGeneric, BufferViewDesc::new(16))
            .unwrap();
        let bogus = BufferViewHandle {
            usage: BufferUse::GpuVertexData,
            index: view.index,
        };
        assert!(memory.view(bogus).is_err());
    }
}
