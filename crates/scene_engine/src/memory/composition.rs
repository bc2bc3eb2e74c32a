//! Composition and component types of accessor elements
//!
//! Every value stored in a shared buffer is a run of 32-bit floats. The
//! composition type says how many floats make up one element and how the
//! element is aligned when it lives in 16-byte (vec4) addressed memory.

use serde::{Deserialize, Serialize};

use crate::foundation::math::utils::align_up;

/// Shape of one accessor element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompositionType {
    /// One float
    Scalar,
    /// Two floats
    Vec2,
    /// Three floats
    Vec3,
    /// Four floats
    Vec4,
    /// 2x2 matrix, column-major
    Mat2,
    /// 3x3 matrix, column-major, nine contiguous floats
    Mat3,
    /// 4x4 matrix, column-major
    Mat4,
    /// Packed array of floats
    ScalarArray,
    /// Packed array of vec2
    Vec2Array,
    /// Packed array of vec3
    Vec3Array,
    /// Array of vec4
    Vec4Array,
    /// Array of 2x2 matrices
    Mat2Array,
    /// Array of 3x3 matrices, each element padded to three vec4s
    Mat3Array,
    /// Array of 4x4 matrices
    Mat4Array,
}

impl CompositionType {
    /// Floats per element (per array entry for array variants)
    pub const fn number_of_components(self) -> usize {
        match self {
            Self::Scalar | Self::ScalarArray => 1,
            Self::Vec2 | Self::Vec2Array => 2,
            Self::Vec3 | Self::Vec3Array => 3,
            Self::Vec4 | Self::Vec4Array | Self::Mat2 | Self::Mat2Array => 4,
            Self::Mat3 | Self::Mat3Array => 9,
            Self::Mat4 | Self::Mat4Array => 16,
        }
    }

    /// Number of vec4 texels one element spans
    pub const fn vec4_size_of_element(self) -> usize {
        self.number_of_components().div_ceil(4)
    }

    /// Whether this is one of the array variants
    pub const fn is_array(self) -> bool {
        matches!(
            self,
            Self::ScalarArray
                | Self::Vec2Array
                | Self::Vec3Array
                | Self::Vec4Array
                | Self::Mat2Array
                | Self::Mat3Array
                | Self::Mat4Array
        )
    }

    /// Arrays whose entries are not padded to 16 bytes
    ///
    /// Their entries are addressed as scalars and may straddle texels.
    pub const fn is_packed_array(self) -> bool {
        matches!(self, Self::ScalarArray | Self::Vec2Array | Self::Vec3Array)
    }

    /// Non-array composition of a single array entry
    pub const fn element_type(self) -> Self {
        match self {
            Self::ScalarArray => Self::Scalar,
            Self::Vec2Array => Self::Vec2,
            Self::Vec3Array => Self::Vec3,
            Self::Vec4Array => Self::Vec4,
            Self::Mat2Array => Self::Mat2,
            Self::Mat3Array => Self::Mat3,
            Self::Mat4Array => Self::Mat4,
            other => other,
        }
    }

    /// Byte distance between consecutive array entries
    pub const fn array_entry_stride(self) -> usize {
        let bytes = self.number_of_components() * 4;
        if self.is_packed_array() {
            bytes
        } else {
            align_up(bytes, 16)
        }
    }

    /// GLSL type of one entry
    pub const fn glsl_type(self) -> &'static str {
        match self.element_type() {
            Self::Scalar => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Mat2 => "mat2",
            Self::Mat3 => "mat3",
            Self::Mat4 => "mat4",
            _ => "vec4",
        }
    }

    /// WGSL type of one entry
    pub const fn wgsl_type(self) -> &'static str {
        match self.element_type() {
            Self::Scalar => "f32",
            Self::Vec2 => "vec2<f32>",
            Self::Vec3 => "vec3<f32>",
            Self::Mat2 => "mat2x2<f32>",
            Self::Mat3 => "mat3x3<f32>",
            Self::Mat4 => "mat4x4<f32>",
            _ => "vec4<f32>",
        }
    }
}

/// Scalar type of the floats in an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ComponentType {
    /// 32-bit float
    #[default]
    Float,
    /// Signed integer stored as float
    Int,
    /// Unsigned integer stored as float
    UnsignedInt,
    /// 0.0 or 1.0
    Bool,
}

impl ComponentType {
    /// Bytes per scalar in buffer storage
    pub const fn byte_size(self) -> usize {
        4
    }
}

/// Bytes one instance of a property occupies in 16-byte addressed memory
///
/// * non-array: `align16(n * 4)`
/// * arrays of 16-byte-aligned entries: `align16(n * 4) * array_length`
/// * packed arrays: `align16(n * 4 * array_length)`
pub const fn aligned_byte_length(composition: CompositionType, array_length: usize) -> usize {
    let entry_bytes = composition.number_of_components() * 4;
    if !composition.is_array() {
        align_up(entry_bytes, 16)
    } else if composition.is_packed_array() {
        align_up(entry_bytes * array_length, 16)
    } else {
        align_up(entry_bytes, 16) * array_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_of_components() {
        assert_eq!(CompositionType::Scalar.number_of_components(), 1);
        assert_eq!(CompositionType::Mat2.number_of_components(), 4);
        assert_eq!(CompositionType::Mat3.number_of_components(), 9);
        assert_eq!(CompositionType::Mat4Array.number_of_components(), 16);
    }

    #[test]
    fn test_vec4_size() {
        assert_eq!(CompositionType::Scalar.vec4_size_of_element(), 1);
        assert_eq!(CompositionType::Vec3.vec4_size_of_element(), 1);
        assert_eq!(CompositionType::Mat3.vec4_size_of_element(), 3);
        assert_eq!(CompositionType::Mat4.vec4_size_of_element(), 4);
    }

    #[test]
    fn test_aligned_byte_length_non_array() {
        assert_eq!(aligned_byte_length(CompositionType::Scalar, 1), 16);
        assert_eq!(aligned_byte_length(CompositionType::Vec3, 1), 16);
        assert_eq!(aligned_byte_length(CompositionType::Mat3, 1), 48);
        assert_eq!(aligned_byte_length(CompositionType::Mat4, 1), 64);
    }

    #[test]
    fn test_aligned_byte_length_arrays() {
        // packed: 7 floats -> 28 bytes -> 32
        assert_eq!(aligned_byte_length(CompositionType::ScalarArray, 7), 32);
        // packed vec3: 3 * 12 = 36 -> 48
        assert_eq!(aligned_byte_length(CompositionType::Vec3Array, 3), 48);
        // aligned: every entry padded
        assert_eq!(aligned_byte_length(CompositionType::Vec4Array, 5), 80);
        assert_eq!(aligned_byte_length(CompositionType::Mat3Array, 2), 96);
        assert_eq!(aligned_byte_length(CompositionType::Mat4Array, 100), 6400);
    }

    #[test]
    fn test_array_entry_stride() {
        assert_eq!(CompositionType::Vec3Array.array_entry_stride(), 12);
        assert_eq!(CompositionType::Mat3Array.array_entry_stride(), 48);
        assert_eq!(CompositionType::Vec4Array.array_entry_stride(), 16);
    }
}
