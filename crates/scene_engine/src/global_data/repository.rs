//! Engine-owned table of global shader properties

use std::collections::HashMap;

use crate::core::EngineLimits;
use crate::ecs::ComponentTid;
use crate::memory::{
    AccessorDesc, BufferUse, BufferViewDesc, ComponentType, CompositionType, ElementSlot,
    MemoryManager, PropertyLocation, PropertyValue,
};

use super::property::{GlobalPropertyStruct, GlobalValue};
use super::semantic::{ShaderSemantic, ShaderSemanticsInfo};
use super::{GlobalDataError, GlobalDataResult};

/// Global properties backed by the instance data buffer
///
/// Each property owns one flexible accessor of `aligned_length * max_count`
/// bytes. Leases hand out count slots in order and are seeded with the
/// property's initial value.
#[derive(Debug, Clone)]
pub struct GlobalDataRepository {
    properties: Vec<GlobalPropertyStruct>,
    index_of: HashMap<ShaderSemantic, usize>,
    default_array_length: usize,
    version: u64,
}

impl GlobalDataRepository {
    /// Create an empty repository
    pub fn new(default_array_length: usize) -> Self {
        Self {
            properties: Vec::new(),
            index_of: HashMap::new(),
            default_array_length,
            version: 0,
        }
    }

    /// Bumped on every registration and lease
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Array length used when a semantic leaves it unspecified
    pub const fn default_array_length(&self) -> usize {
        self.default_array_length
    }

    /// Register a property with room for `max_count` leases
    ///
    /// Registering the same semantic twice keeps the first registration.
    pub fn register_property(
        &mut self,
        memory: &mut MemoryManager,
        info: ShaderSemanticsInfo,
        max_count: usize,
    ) -> GlobalDataResult<()> {
        if self.index_of.contains_key(&info.semantic) {
            log::debug!("Global property {} already registered", info.semantic);
            return Ok(());
        }

        let layout = info.layout(self.default_array_length);
        let aligned_length = layout.aligned_byte_length();
        let view = memory.take_buffer_view(
            BufferUse::GpuInstanceData,
            BufferViewDesc::new(aligned_length * max_count).with_align(16),
        )?;
        let accessor = memory.take_flexible_accessor(
            view,
            AccessorDesc::new(info.composition_type, max_count)
                .with_component_type(info.component_type)
                .with_array_length(layout.array_length),
            aligned_length,
        )?;

        log::debug!(
            "Registered global property {} ({:?} x{}, {} bytes each)",
            info.semantic,
            info.composition_type,
            max_count,
            aligned_length
        );

        self.index_of.insert(info.semantic.clone(), self.properties.len());
        self.properties.push(GlobalPropertyStruct {
            info,
            layout,
            max_count,
            accessor,
            values: Vec::new(),
        });
        self.version += 1;
        Ok(())
    }

    /// Register the semantics every scene needs
    pub fn register_default_properties(
        &mut self,
        memory: &mut MemoryManager,
        limits: &EngineLimits,
    ) -> GlobalDataResult<()> {
        let defaults = [
            (
                ShaderSemanticsInfo::new(
                    ShaderSemantic::CURRENT_COMPONENT_SIDS,
                    CompositionType::ScalarArray,
                )
                .with_array_length(ComponentTid::COUNT)
                .with_component_type(ComponentType::Int)
                .per_draw(),
                1,
            ),
            (
                ShaderSemanticsInfo::new(ShaderSemantic::VIEW_MATRIX, CompositionType::Mat4)
                    .indexed_by(ComponentTid::CAMERA),
                limits.max_cameras,
            ),
            (
                ShaderSemanticsInfo::new(ShaderSemantic::PROJECTION_MATRIX, CompositionType::Mat4)
                    .indexed_by(ComponentTid::CAMERA),
                limits.max_cameras,
            ),
            (
                ShaderSemanticsInfo::new(ShaderSemantic::VIEW_POSITION, CompositionType::Vec3)
                    .indexed_by(ComponentTid::CAMERA),
                limits.max_cameras,
            ),
            (
                ShaderSemanticsInfo::new(ShaderSemantic::LIGHT_NUMBER, CompositionType::Scalar)
                    .with_component_type(ComponentType::Int),
                1,
            ),
            (
                ShaderSemanticsInfo::new(ShaderSemantic::LIGHT_POSITION, CompositionType::Vec3Array)
                    .with_array_length(limits.max_lights),
                1,
            ),
            (
                ShaderSemanticsInfo::new(
                    ShaderSemantic::LIGHT_DIRECTION,
                    CompositionType::Vec3Array,
                )
                .with_array_length(limits.max_lights),
                1,
            ),
            (
                ShaderSemanticsInfo::new(
                    ShaderSemantic::LIGHT_INTENSITY,
                    CompositionType::Vec3Array,
                )
                .with_array_length(limits.max_lights),
                1,
            ),
            (
                ShaderSemanticsInfo::new(ShaderSemantic::LIGHT_PROPERTY, CompositionType::Vec4Array)
                    .with_array_length(limits.max_lights),
                1,
            ),
            (
                ShaderSemanticsInfo::new(ShaderSemantic::BONE_MATRIX, CompositionType::Mat4Array)
                    .with_array_length(limits.max_bones_per_skeleton),
                limits.max_skeletons,
            ),
            (
                ShaderSemanticsInfo::new(ShaderSemantic::TIME, CompositionType::Scalar),
                1,
            ),
        ];
        for (info, max_count) in defaults {
            self.register_property(memory, info, max_count)?;
        }
        Ok(())
    }

    /// Lease the next count slot of a semantic
    ///
    /// `None` when the semantic is unregistered or every slot is leased (the
    /// latter is logged); [`Self::try_take_one`] reports which.
    pub fn take_one(
        &mut self,
        memory: &mut MemoryManager,
        semantic: &ShaderSemantic,
        array_index: usize,
    ) -> Option<GlobalValue> {
        match self.try_take_one(memory, semantic, array_index) {
            Ok(value) => Some(value),
            Err(GlobalDataError::Unregistered(_)) => None,
            Err(err) => {
                log::warn!("Cannot lease global property {semantic}: {err}");
                None
            }
        }
    }

    /// Lease the next count slot of a semantic, reporting why it failed
    pub fn try_take_one(
        &mut self,
        memory: &mut MemoryManager,
        semantic: &ShaderSemantic,
        array_index: usize,
    ) -> GlobalDataResult<GlobalValue> {
        let index = *self
            .index_of
            .get(semantic)
            .ok_or_else(|| GlobalDataError::Unregistered(semantic.to_string()))?;
        let property = &mut self.properties[index];
        if property.is_exhausted() {
            return Err(GlobalDataError::LeaseCapacityExceeded {
                semantic: semantic.to_string(),
                max_count: property.max_count,
            });
        }
        if array_index >= property.layout.array_length {
            return Err(GlobalDataError::IndexOutOfRange {
                semantic: semantic.to_string(),
                index: array_index,
                length: property.layout.array_length,
            });
        }

        let slot = memory.take_one(property.accessor)?;
        match &property.info.initial_value {
            PropertyValue::Array(..) => memory.write_value(slot, &property.info.initial_value)?,
            value => {
                for entry in 0..property.layout.array_length {
                    memory.write_value_at(slot, entry, value)?;
                }
            }
        }

        let count_index = property.values.len();
        property.values.push(slot);
        self.version += 1;
        Ok(GlobalValue {
            semantic: semantic.clone(),
            count_index,
            array_index,
            slot,
        })
    }

    /// Write a leased value; `false` when the semantic or lease is unknown
    pub fn set_value(
        &self,
        memory: &mut MemoryManager,
        semantic: &ShaderSemantic,
        count_index: usize,
        array_index: usize,
        value: &PropertyValue,
    ) -> bool {
        let Some(slot) = self.slot(semantic, count_index) else {
            return false;
        };
        match memory.write_value_at(slot, array_index, value) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Cannot write global property {semantic}[{count_index}]: {err}");
                false
            }
        }
    }

    /// Read a leased value; `None` when the semantic or lease is unknown
    pub fn get_value(
        &self,
        memory: &MemoryManager,
        semantic: &ShaderSemantic,
        count_index: usize,
        array_index: usize,
    ) -> Option<PropertyValue> {
        let slot = self.slot(semantic, count_index)?;
        memory.read_value_at(slot, array_index).ok()
    }

    /// Live handle to an already leased count slot
    pub fn leased_value(
        &self,
        semantic: &ShaderSemantic,
        count_index: usize,
        array_index: usize,
    ) -> Option<GlobalValue> {
        let slot = self.slot(semantic, count_index)?;
        Some(GlobalValue {
            semantic: semantic.clone(),
            count_index,
            array_index,
            slot,
        })
    }

    fn slot(&self, semantic: &ShaderSemantic, count_index: usize) -> Option<ElementSlot> {
        self.property(semantic)?.values.get(count_index).copied()
    }

    /// Registered property of a semantic
    pub fn property(&self, semantic: &ShaderSemantic) -> Option<&GlobalPropertyStruct> {
        self.index_of.get(semantic).map(|&i| &self.properties[i])
    }

    /// All registered properties in registration order
    pub fn properties(&self) -> &[GlobalPropertyStruct] {
        &self.properties
    }

    /// Offset of a property in vec4 units from the start of instance memory
    pub fn location_offset_of_property(
        &self,
        memory: &MemoryManager,
        semantic: &ShaderSemantic,
    ) -> Option<usize> {
        let property = self.property(semantic)?;
        let accessor = memory.accessor(property.accessor).ok()?;
        Some(accessor.byte_offset_in_buffer() / 16)
    }

    /// Full vec4 location of a property
    pub fn location_of_property(
        &self,
        memory: &MemoryManager,
        semantic: &ShaderSemantic,
    ) -> Option<PropertyLocation> {
        let property = self.property(semantic)?;
        let offset = self.location_offset_of_property(memory, semantic)?;
        Some(PropertyLocation::single(property.layout, offset, property.max_count))
    }
}
