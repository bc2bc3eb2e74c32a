//! Shader semantics and their descriptions

use std::borrow::Cow;
use std::fmt;

use bitflags::bitflags;

use crate::ecs::ComponentTid;
use crate::memory::{ComponentType, CompositionType, PropertyLayout, PropertyValue};

/// Name of a shader input that is meaningful across component types
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderSemantic(Cow<'static, str>);

impl ShaderSemantic {
    /// SIDs of the components being drawn, indexed by component TID
    pub const CURRENT_COMPONENT_SIDS: Self = Self::from_static("currentComponentSIDs");
    /// Camera view matrix
    pub const VIEW_MATRIX: Self = Self::from_static("viewMatrix");
    /// Camera projection matrix
    pub const PROJECTION_MATRIX: Self = Self::from_static("projectionMatrix");
    /// Camera world position
    pub const VIEW_POSITION: Self = Self::from_static("viewPosition");
    /// Number of active lights
    pub const LIGHT_NUMBER: Self = Self::from_static("lightNumber");
    /// Light world positions
    pub const LIGHT_POSITION: Self = Self::from_static("lightPosition");
    /// Light world directions
    pub const LIGHT_DIRECTION: Self = Self::from_static("lightDirection");
    /// Light color times intensity
    pub const LIGHT_INTENSITY: Self = Self::from_static("lightIntensity");
    /// Light type, range and spot cone cosines
    pub const LIGHT_PROPERTY: Self = Self::from_static("lightProperty");
    /// Skinning matrices
    pub const BONE_MATRIX: Self = Self::from_static("boneMatrix");
    /// Seconds since engine start
    pub const TIME: Self = Self::from_static("time");
    /// Instance world matrix
    pub const WORLD_MATRIX: Self = Self::from_static("worldMatrix");
    /// Instance normal matrix
    pub const NORMAL_MATRIX: Self = Self::from_static("normalMatrix");
    /// Instance visibility flag
    pub const IS_VISIBLE: Self = Self::from_static("isVisible");
    /// Instance billboard flag
    pub const IS_BILLBOARD: Self = Self::from_static("isBillboard");
    /// Base color of the built-in materials
    pub const BASE_COLOR_FACTOR: Self = Self::from_static("baseColorFactor");
    /// Metallic and roughness of the built-in materials
    pub const METALLIC_ROUGHNESS_FACTOR: Self = Self::from_static("metallicRoughnessFactor");

    /// Semantic with a static name
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Semantic with a runtime name
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Name as used in generated shader code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShaderSemantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ShaderSemantic {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

bitflags! {
    /// Shader stages a property is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStage: u32 {
        /// Vertex stage
        const VERTEX = 1 << 0;
        /// Fragment stage
        const FRAGMENT = 1 << 1;
        /// Compute stage
        const COMPUTE = 1 << 2;
        /// Vertex and fragment stages
        const VERTEX_FRAGMENT = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

/// Full description of a shader property
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSemanticsInfo {
    /// Semantic name
    pub semantic: ShaderSemantic,
    /// Element shape
    pub composition_type: CompositionType,
    /// Scalar type
    pub component_type: ComponentType,
    /// Entries for array compositions; `None` uses the engine default
    pub array_length: Option<usize>,
    /// Stages the property is read in
    pub stage: ShaderStage,
    /// Value seeded into every new lease
    pub initial_value: PropertyValue,
    /// Component type whose current SID selects the instance when drawing
    pub indexed_by: Option<ComponentTid>,
    /// Set by the renderer on every draw as a plain uniform, never fetched
    /// from instance memory
    pub per_draw: bool,
}

impl ShaderSemanticsInfo {
    /// Float property read by both stages, seeded with zero/identity
    pub fn new(semantic: ShaderSemantic, composition_type: CompositionType) -> Self {
        Self {
            semantic,
            composition_type,
            component_type: ComponentType::Float,
            array_length: None,
            stage: ShaderStage::VERTEX_FRAGMENT,
            initial_value: PropertyValue::identity_of(composition_type),
            indexed_by: None,
            per_draw: false,
        }
    }

    /// Set the number of array entries
    pub const fn with_array_length(mut self, array_length: usize) -> Self {
        self.array_length = Some(array_length);
        self
    }

    /// Set the scalar type
    pub const fn with_component_type(mut self, component_type: ComponentType) -> Self {
        self.component_type = component_type;
        self
    }

    /// Set the stages
    pub const fn with_stage(mut self, stage: ShaderStage) -> Self {
        self.stage = stage;
        self
    }

    /// Set the value seeded into new leases
    pub fn with_initial_value(mut self, value: PropertyValue) -> Self {
        self.initial_value = value;
        self
    }

    /// Select instances by the current SID of a component type
    pub const fn indexed_by(mut self, tid: ComponentTid) -> Self {
        self.indexed_by = Some(tid);
        self
    }

    /// Mark as a per-draw uniform
    pub const fn per_draw(mut self) -> Self {
        self.per_draw = true;
        self
    }

    /// Entries per instance, falling back to `default_array_length` for arrays
    pub fn resolved_array_length(&self, default_array_length: usize) -> usize {
        if self.composition_type.is_array() {
            self.array_length.unwrap_or(default_array_length)
        } else {
            1
        }
    }

    /// Memory layout of one instance
    pub fn layout(&self, default_array_length: usize) -> PropertyLayout {
        PropertyLayout::new(
            self.composition_type,
            self.resolved_array_length(default_array_length),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_length_defaults() {
        let info =
            ShaderSemanticsInfo::new(ShaderSemantic::BONE_MATRIX, CompositionType::Mat4Array);
        assert_eq!(info.resolved_array_length(100), 100);
        assert_eq!(info.layout(100).aligned_byte_length(), 6400);

        let scalar = ShaderSemanticsInfo::new(ShaderSemantic::TIME, CompositionType::Scalar)
            .with_array_length(9);
        assert_eq!(scalar.resolved_array_length(100), 1);
    }

    #[test]
    fn test_semantic_equality_ignores_storage() {
        let dynamic = ShaderSemantic::new(String::from("viewMatrix"));
        assert_eq!(dynamic, ShaderSemantic::VIEW_MATRIX);
        assert_eq!(ShaderSemantic::VIEW_MATRIX.to_string(), "viewMatrix");
    }
}
