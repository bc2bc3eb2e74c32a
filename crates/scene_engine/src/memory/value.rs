//! Typed values read from and written to accessor elements

use crate::foundation::math::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

use super::composition::CompositionType;

/// A typed value matching one of the [`CompositionType`]s
///
/// Matrices are flattened column-major, which is also how they sit in memory.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Single float
    Scalar(f32),
    /// 2D vector
    Vec2(Vec2),
    /// 3D vector
    Vec3(Vec3),
    /// 4D vector
    Vec4(Vec4),
    /// 2x2 matrix
    Mat2(Mat2),
    /// 3x3 matrix
    Mat3(Mat3),
    /// 4x4 matrix
    Mat4(Mat4),
    /// Array of entries of one non-array composition
    Array(CompositionType, Vec<PropertyValue>),
}

impl PropertyValue {
    /// Composition type describing this value
    pub fn composition_type(&self) -> CompositionType {
        match self {
            Self::Scalar(_) => CompositionType::Scalar,
            Self::Vec2(_) => CompositionType::Vec2,
            Self::Vec3(_) => CompositionType::Vec3,
            Self::Vec4(_) => CompositionType::Vec4,
            Self::Mat2(_) => CompositionType::Mat2,
            Self::Mat3(_) => CompositionType::Mat3,
            Self::Mat4(_) => CompositionType::Mat4,
            Self::Array(array_type, _) => *array_type,
        }
    }

    /// Zero value of a non-array composition, identity for matrices
    pub fn identity_of(composition: CompositionType) -> Self {
        match composition.element_type() {
            CompositionType::Scalar => Self::Scalar(0.0),
            CompositionType::Vec2 => Self::Vec2(Vec2::zeros()),
            CompositionType::Vec3 => Self::Vec3(Vec3::zeros()),
            CompositionType::Mat2 => Self::Mat2(Mat2::identity()),
            CompositionType::Mat3 => Self::Mat3(Mat3::identity()),
            CompositionType::Mat4 => Self::Mat4(Mat4::identity()),
            _ => Self::Vec4(Vec4::zeros()),
        }
    }

    /// Flattened floats of a non-array value; arrays concatenate their entries
    pub fn to_floats(&self) -> Vec<f32> {
        match self {
            Self::Scalar(v) => vec![*v],
            Self::Vec2(v) => v.as_slice().to_vec(),
            Self::Vec3(v) => v.as_slice().to_vec(),
            Self::Vec4(v) => v.as_slice().to_vec(),
            Self::Mat2(m) => m.as_slice().to_vec(),
            Self::Mat3(m) => m.as_slice().to_vec(),
            Self::Mat4(m) => m.as_slice().to_vec(),
            Self::Array(_, entries) => entries.iter().flat_map(Self::to_floats).collect(),
        }
    }

    /// Rebuild a non-array value from its flattened floats
    pub fn from_floats(composition: CompositionType, floats: &[f32]) -> Option<Self> {
        let element = composition.element_type();
        if floats.len() != element.number_of_components() {
            return None;
        }
        Some(match element {
            CompositionType::Scalar => Self::Scalar(floats[0]),
            CompositionType::Vec2 => Self::Vec2(Vec2::from_column_slice(floats)),
            CompositionType::Vec3 => Self::Vec3(Vec3::from_column_slice(floats)),
            CompositionType::Mat2 => Self::Mat2(Mat2::from_column_slice(floats)),
            CompositionType::Mat3 => Self::Mat3(Mat3::from_column_slice(floats)),
            CompositionType::Mat4 => Self::Mat4(Mat4::from_column_slice(floats)),
            _ => Self::Vec4(Vec4::from_column_slice(floats)),
        })
    }

    /// Scalar payload, if this is a scalar
    pub const fn as_scalar(&self) -> Option<f32> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Matrix payload, if this is a 4x4 matrix
    pub const fn as_mat4(&self) -> Option<&Mat4> {
        match self {
            Self::Mat4(m) => Some(m),
            _ => None,
        }
    }

    /// Vector payload, if this is a vec3
    pub const fn as_vec3(&self) -> Option<&Vec3> {
        match self {
            Self::Vec3(v) => Some(v),
            _ => None,
        }
    }

    /// Vector payload, if this is a vec4
    pub const fn as_vec4(&self) -> Option<&Vec4> {
        match self {
            Self::Vec4(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec3> for PropertyValue {
    fn from(value: Vec3) -> Self {
        Self::Vec3(value)
    }
}

impl From<Vec4> for PropertyValue {
    fn from(value: Vec4) -> Self {
        Self::Vec4(value)
    }
}

impl From<Mat3> for PropertyValue {
    fn from(value: Mat3) -> Self {
        Self::Mat3(value)
    }
}

impl From<Mat4> for PropertyValue {
    fn from(value: Mat4) -> Self {
        Self::Mat4(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat3_is_column_major() {
        let m = Mat3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let floats = PropertyValue::Mat3(m).to_floats();
        assert_eq!(floats, vec![1.0, 4.0, 7.0, 2.0, 5.0, 8.0, 3.0, 6.0, 9.0]);
        assert_eq!(
            PropertyValue::from_floats(CompositionType::Mat3, &floats),
            Some(PropertyValue::Mat3(m))
        );
    }

    #[test]
    fn test_from_floats_rejects_wrong_length() {
        assert!(PropertyValue::from_floats(CompositionType::Vec3, &[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_array_composition_reported() {
        let value = PropertyValue::Array(
            CompositionType::Vec3Array,
            vec![PropertyValue::Vec3(Vec3::x()), PropertyValue::Vec3(Vec3::y())],
        );
        assert_eq!(value.composition_type(), CompositionType::Vec3Array);
        assert_eq!(value.to_floats().len(), 6);
    }
}
