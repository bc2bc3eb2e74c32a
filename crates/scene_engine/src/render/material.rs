//! Material types and instances
//!
//! A material type declares the shader semantics its instances carry; each
//! semantic gets one property block of `aligned_length * max_instances` bytes
//! in instance memory, addressed by the material SID exactly like a global
//! property is addressed by its count index.

use std::collections::HashMap;

use crate::core::StrategyKind;
use crate::global_data::{ShaderSemantic, ShaderSemanticsInfo};
use crate::memory::{
    AccessorDesc, AccessorHandle, BufferUse, BufferViewDesc, ElementSlot, MemoryManager,
    PropertyLayout, PropertyLocation, PropertyValue,
};

use super::cg_api::ProgramHandle;
use super::{RenderError, RenderResult};

/// Material identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialUid(pub u32);

/// How a material blends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    /// Drawn in the opaque block, front to back
    #[default]
    Opaque,
    /// Drawn after every opaque primitive, back to front
    Translucent,
}

impl AlphaMode {
    /// Whether primitives using this mode go to the translucent block
    pub const fn is_translucent(self) -> bool {
        matches!(self, Self::Translucent)
    }
}

/// Material shader bodies
///
/// Property getters and fetch helpers are prepended by the active strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    /// Vertex stage body
    pub vertex: String,
    /// Fragment stage body
    pub fragment: String,
}

impl ShaderSource {
    /// Bodies for both stages
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

/// One semantic's storage inside a material type
#[derive(Debug, Clone)]
pub struct MaterialPropertyBlock {
    /// Semantic description
    pub info: ShaderSemanticsInfo,
    /// Per-instance layout
    pub layout: PropertyLayout,
    /// Flexible accessor over every instance
    pub accessor: AccessorHandle,
}

/// A registered material type
#[derive(Debug, Clone)]
pub struct MaterialType {
    name: String,
    blocks: Vec<MaterialPropertyBlock>,
    max_instances: usize,
    instance_count: usize,
    shader: ShaderSource,
    last_working_shader: Option<ShaderSource>,
}

impl MaterialType {
    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Property blocks in declaration order
    pub fn blocks(&self) -> &[MaterialPropertyBlock] {
        &self.blocks
    }

    /// Maximum instances
    pub const fn max_instances(&self) -> usize {
        self.max_instances
    }

    /// Instances created so far
    pub const fn instance_count(&self) -> usize {
        self.instance_count
    }

    /// Current shader bodies
    pub const fn shader(&self) -> &ShaderSource {
        &self.shader
    }

    /// Last shader bodies a program was successfully created from
    pub const fn last_working_shader(&self) -> Option<&ShaderSource> {
        self.last_working_shader.as_ref()
    }

    fn block_index(&self, semantic: &ShaderSemantic) -> Option<usize> {
        self.blocks.iter().position(|b| &b.info.semantic == semantic)
    }
}

/// A material instance
#[derive(Debug, Clone)]
pub struct Material {
    uid: MaterialUid,
    type_name: String,
    material_sid: usize,
    alpha_mode: AlphaMode,
    is_texture_ready: bool,
    slots: Vec<ElementSlot>,
    programs: Vec<(StrategyKind, ProgramHandle)>,
}

impl Material {
    /// Identifier
    pub const fn uid(&self) -> MaterialUid {
        self.uid
    }

    /// Name of the material type
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Serial id within the material type (instance index in the shader)
    pub const fn material_sid(&self) -> usize {
        self.material_sid
    }

    /// Blend mode
    pub const fn alpha_mode(&self) -> AlphaMode {
        self.alpha_mode
    }

    /// Change the blend mode
    pub fn set_alpha_mode(&mut self, alpha_mode: AlphaMode) {
        self.alpha_mode = alpha_mode;
    }

    /// Whether every texture the material samples has arrived
    pub const fn is_texture_ready(&self) -> bool {
        self.is_texture_ready
    }

    /// Mark textures as loading or loaded
    pub fn set_texture_ready(&mut self, ready: bool) {
        self.is_texture_ready = ready;
    }

    /// Program created for a strategy
    pub fn program(&self, strategy: StrategyKind) -> Option<ProgramHandle> {
        self.programs
            .iter()
            .find(|(kind, _)| *kind == strategy)
            .map(|(_, program)| *program)
    }

    /// Record (or clear) the program of a strategy
    pub fn set_program(&mut self, strategy: StrategyKind, program: Option<ProgramHandle>) {
        self.programs.retain(|(kind, _)| *kind != strategy);
        if let Some(program) = program {
            self.programs.push((strategy, program));
        }
    }
}

/// Registered material types and their instances
#[derive(Debug, Clone, Default)]
pub struct MaterialRepository {
    types: Vec<MaterialType>,
    type_index: HashMap<String, usize>,
    materials: Vec<Material>,
    default_array_length: usize,
    version: u64,
}

impl MaterialRepository {
    /// Create an empty repository
    pub fn new(default_array_length: usize) -> Self {
        Self {
            default_array_length,
            ..Self::default()
        }
    }

    /// Bumped whenever a type, instance or shader source changes
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Register a material type and allocate its property blocks
    pub fn register_material_type(
        &mut self,
        memory: &mut MemoryManager,
        name: &str,
        semantics: Vec<ShaderSemanticsInfo>,
        max_instances: usize,
        shader: ShaderSource,
    ) -> RenderResult<()> {
        if self.type_index.contains_key(name) {
            return Err(RenderError::DuplicateMaterialType(name.to_string()));
        }
        let max_instances = max_instances.max(1);
        let mut blocks = Vec::with_capacity(semantics.len());
        for info in semantics {
            let layout = info.layout(self.default_array_length);
            let aligned_length = layout.aligned_byte_length();
            let view = memory.take_buffer_view(
                BufferUse::GpuInstanceData,
                BufferViewDesc::new(aligned_length * max_instances).with_align(16),
            )?;
            let accessor = memory.take_flexible_accessor(
                view,
                AccessorDesc::new(info.composition_type, max_instances)
                    .with_component_type(info.component_type)
                    .with_array_length(layout.array_length),
                aligned_length,
            )?;
            blocks.push(MaterialPropertyBlock {
                info,
                layout,
                accessor,
            });
        }

        log::debug!(
            "Registered material type {name} ({} properties, max {max_instances})",
            blocks.len()
        );
        self.type_index.insert(name.to_string(), self.types.len());
        self.types.push(MaterialType {
            name: name.to_string(),
            blocks,
            max_instances,
            instance_count: 0,
            shader,
            last_working_shader: None,
        });
        self.version += 1;
        Ok(())
    }

    /// Create an instance of a material type, seeded with initial values
    pub fn create_material(
        &mut self,
        memory: &mut MemoryManager,
        type_name: &str,
    ) -> RenderResult<MaterialUid> {
        let index = *self
            .type_index
            .get(type_name)
            .ok_or_else(|| RenderError::MissingMaterial(type_name.to_string()))?;
        let material_type = &mut self.types[index];
        if material_type.instance_count >= material_type.max_instances {
            return Err(RenderError::MaterialCapacityExceeded {
                name: type_name.to_string(),
                max_instances: material_type.max_instances,
            });
        }

        let mut slots = Vec::with_capacity(material_type.blocks.len());
        for block in &material_type.blocks {
            let slot = memory.take_one(block.accessor)?;
            match &block.info.initial_value {
                PropertyValue::Array(..) => memory.write_value(slot, &block.info.initial_value)?,
                value => {
                    for entry in 0..block.layout.array_length {
                        memory.write_value_at(slot, entry, value)?;
                    }
                }
            }
            slots.push(slot);
        }

        let material_sid = material_type.instance_count;
        material_type.instance_count += 1;
        let uid = MaterialUid(self.materials.len() as u32);
        self.materials.push(Material {
            uid,
            type_name: type_name.to_string(),
            material_sid,
            alpha_mode: AlphaMode::Opaque,
            is_texture_ready: true,
            slots,
            programs: Vec::new(),
        });
        self.version += 1;
        Ok(uid)
    }

    /// Write a parameter in place
    pub fn set_parameter(
        &self,
        memory: &mut MemoryManager,
        uid: MaterialUid,
        semantic: &ShaderSemantic,
        value: &PropertyValue,
    ) -> RenderResult<()> {
        let slot = self.slot(uid, semantic)?;
        memory.write_value(slot, value)?;
        Ok(())
    }

    /// Read a parameter
    pub fn get_parameter(
        &self,
        memory: &MemoryManager,
        uid: MaterialUid,
        semantic: &ShaderSemantic,
    ) -> RenderResult<PropertyValue> {
        let slot = self.slot(uid, semantic)?;
        Ok(memory.read_value(slot)?)
    }

    fn slot(&self, uid: MaterialUid, semantic: &ShaderSemantic) -> RenderResult<ElementSlot> {
        let material = self
            .material(uid)
            .ok_or_else(|| RenderError::MissingMaterial(format!("{uid:?}")))?;
        let material_type = self
            .material_type(&material.type_name)
            .ok_or_else(|| RenderError::MissingMaterial(material.type_name.clone()))?;
        material_type
            .block_index(semantic)
            .and_then(|i| material.slots.get(i).copied())
            .ok_or_else(|| {
                RenderError::MissingMaterial(format!("{}.{semantic}", material.type_name))
            })
    }

    /// Offset of a material property in vec4 units
    pub fn location_offset_of_member_of_material(
        &self,
        memory: &MemoryManager,
        type_name: &str,
        semantic: &ShaderSemantic,
    ) -> Option<usize> {
        let material_type = self.material_type(type_name)?;
        let block = &material_type.blocks[material_type.block_index(semantic)?];
        let accessor = memory.accessor(block.accessor).ok()?;
        Some(accessor.byte_offset_in_buffer() / 16)
    }

    /// Full vec4 location of a material property
    pub fn location_of_member_of_material(
        &self,
        memory: &MemoryManager,
        type_name: &str,
        semantic: &ShaderSemantic,
    ) -> Option<PropertyLocation> {
        let material_type = self.material_type(type_name)?;
        let block = &material_type.blocks[material_type.block_index(semantic)?];
        let offset = self.location_offset_of_member_of_material(memory, type_name, semantic)?;
        Some(PropertyLocation::single(
            block.layout,
            offset,
            material_type.max_instances,
        ))
    }

    /// Material type by name
    pub fn material_type(&self, name: &str) -> Option<&MaterialType> {
        self.type_index.get(name).map(|&i| &self.types[i])
    }

    /// Every material type
    pub fn material_types(&self) -> &[MaterialType] {
        &self.types
    }

    /// Material by UID
    pub fn material(&self, uid: MaterialUid) -> Option<&Material> {
        self.materials.get(uid.0 as usize)
    }

    /// Material by UID, mutable
    pub fn material_mut(&mut self, uid: MaterialUid) -> Option<&mut Material> {
        self.materials.get_mut(uid.0 as usize)
    }

    /// Every material
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Replace the shader bodies of a type
    pub fn set_shader_source(&mut self, type_name: &str, shader: ShaderSource) -> RenderResult<()> {
        let material_type = self.material_type_mut(type_name)?;
        material_type.shader = shader;
        self.version += 1;
        Ok(())
    }

    /// Remember the current shader bodies as known good
    pub fn mark_shader_working(&mut self, type_name: &str) {
        if let Ok(material_type) = self.material_type_mut(type_name) {
            if material_type.last_working_shader.as_ref() != Some(&material_type.shader) {
                material_type.last_working_shader = Some(material_type.shader.clone());
            }
        }
    }

    /// Roll the shader bodies back to the last working ones
    ///
    /// Returns `false` when there is nothing different to roll back to.
    pub fn restore_backup(&mut self, type_name: &str) -> bool {
        let Ok(material_type) = self.material_type_mut(type_name) else {
            return false;
        };
        let backup = match &material_type.last_working_shader {
            Some(backup) if *backup != material_type.shader => backup.clone(),
            _ => return false,
        };
        log::warn!("Restoring last working shader of material type {type_name}");
        material_type.shader = backup;
        self.version += 1;
        true
    }

    fn material_type_mut(&mut self, name: &str) -> RenderResult<&mut MaterialType> {
        let index = *self
            .type_index
            .get(name)
            .ok_or_else(|| RenderError::MissingMaterial(name.to_string()))?;
        Ok(&mut self.types[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BufferCapacities;
    use crate::foundation::math::Vec4;
    use crate::memory::CompositionType;

    fn setup() -> (MemoryManager, MaterialRepository) {
        let mut memory = MemoryManager::new(&BufferCapacities::default());
        let mut materials = MaterialRepository::new(100);
        materials
            .register_material_type(
                &mut memory,
                "pbr",
                vec![
                    ShaderSemanticsInfo::new(
                        ShaderSemantic::BASE_COLOR_FACTOR,
                        CompositionType::Vec4,
                    )
                    .with_initial_value(PropertyValue::Vec4(Vec4::new(1.0, 1.0, 1.0, 1.0))),
                    ShaderSemanticsInfo::new(
                        ShaderSemantic::METALLIC_ROUGHNESS_FACTOR,
                        CompositionType::Vec2,
                    ),
                ],
                2,
                ShaderSource::new("void main() {}", "void main() {}"),
            )
            .unwrap();
        (memory, materials)
    }

    #[test]
    fn test_parameters_round_trip() {
        let (mut memory, mut materials) = setup();
        let uid = materials.create_material(&mut memory, "pbr").unwrap();

        let initial = materials
            .get_parameter(&memory, uid, &ShaderSemantic::BASE_COLOR_FACTOR)
            .unwrap();
        assert_eq!(initial, PropertyValue::Vec4(Vec4::new(1.0, 1.0, 1.0, 1.0)));

        let red = PropertyValue::Vec4(Vec4::new(1.0, 0.0, 0.0, 1.0));
        materials
            .set_parameter(&mut memory, uid, &ShaderSemantic::BASE_COLOR_FACTOR, &red)
            .unwrap();
        assert_eq!(
            materials
                .get_parameter(&memory, uid, &ShaderSemantic::BASE_COLOR_FACTOR)
                .unwrap(),
            red
        );
    }

    #[test]
    fn test_instance_limit_and_sids() {
        let (mut memory, mut materials) = setup();
        let a = materials.create_material(&mut memory, "pbr").unwrap();
        let b = materials.create_material(&mut memory, "pbr").unwrap();
        assert_eq!(materials.material(a).unwrap().material_sid(), 0);
        assert_eq!(materials.material(b).unwrap().material_sid(), 1);
        assert!(matches!(
            materials.create_material(&mut memory, "pbr"),
            Err(RenderError::MaterialCapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_location_matches_slot_offset() {
        let (mut memory, mut materials) = setup();
        let uid = materials.create_material(&mut memory, "pbr").unwrap();
        let location = materials
            .location_of_member_of_material(&memory, "pbr", &ShaderSemantic::BASE_COLOR_FACTOR)
            .unwrap();
        let slot = materials.slot(uid, &ShaderSemantic::BASE_COLOR_FACTOR).unwrap();
        let byte_offset = memory.slot_byte_offset(slot).unwrap();
        assert_eq!(location.vec4_index(0, 0), Some(byte_offset / 16));
    }

    #[test]
    fn test_restore_backup() {
        let (_, mut materials) = setup();
        assert!(!materials.restore_backup("pbr"));

        materials.mark_shader_working("pbr");
        materials
            .set_shader_source("pbr", ShaderSource::new("broken", "broken"))
            .unwrap();
        let version = materials.version();
        assert!(materials.restore_backup("pbr"));
        assert!(materials.version() > version);
        assert_eq!(
            materials.material_type("pbr").unwrap().shader().vertex,
            "void main() {}"
        );
    }
}
