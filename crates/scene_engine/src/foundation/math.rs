//! Math utilities and types
//!
//! Provides the nalgebra aliases used throughout the engine plus the small set
//! of helpers the component logic and CPU culling need. Matrices follow the
//! OpenGL/WebGL convention (right-handed, clip-space depth in [-1, 1]) and are
//! stored column-major, which is also the order they are packed into GPU
//! buffers.

pub use nalgebra::{Matrix2, Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 2x2 matrix type
pub type Mat2 = Matrix2<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Build a translate * rotate * scale matrix
pub fn compose_trs(translate: &Vec3, rotate: &Quat, scale: &Vec3) -> Mat4 {
    Mat4::new_translation(translate)
        * rotate.to_homogeneous()
        * Mat4::new_nonuniform_scaling(scale)
}

/// Inverse-transpose of the upper 3x3 block of a world matrix
///
/// Falls back to the plain 3x3 block when the matrix is singular (zero scale),
/// which keeps normals finite for collapsed objects.
pub fn normal_matrix(world: &Mat4) -> Mat3 {
    let upper: Mat3 = world.fixed_view::<3, 3>(0, 0).into_owned();
    upper
        .try_inverse()
        .map_or(upper, |inverse| inverse.transpose())
}

/// Translation part of an affine matrix
pub fn world_position(matrix: &Mat4) -> Vec3 {
    Vec3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)])
}

/// Direction the local -Z axis points to after applying `matrix`
pub fn forward_direction(matrix: &Mat4) -> Vec3 {
    let forward = matrix.transform_vector(&Vec3::new(0.0, 0.0, -1.0));
    let length = forward.norm();
    if length > f32::EPSILON {
        forward / length
    } else {
        Vec3::new(0.0, 0.0, -1.0)
    }
}

/// Distance in front of the camera described by `view` (positive = visible side)
pub fn view_depth(view: &Mat4, world_point: &Vec3) -> f32 {
    -view.transform_point(&Point3::from(*world_point)).z
}

/// Axis-Aligned Bounding Box for culling and depth sorting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Compute the bounds of a packed xyz position stream
    pub fn from_positions(positions: &[f32]) -> Option<Self> {
        let mut chunks = positions.chunks_exact(3);
        let first = chunks.next()?;
        let mut min = Vec3::new(first[0], first[1], first[2]);
        let mut max = min;
        for p in chunks {
            let point = Vec3::new(p[0], p[1], p[2]);
            min = min.inf(&point);
            max = max.sup(&point);
        }
        Some(Self { min, max })
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Merge two boxes into the box containing both
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Bounds of this box after an affine transform
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let mut result: Option<Aabb> = None;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = matrix.transform_point(&Point3::from(corner)).coords;
            let point_box = Aabb::new(p, p);
            result = Some(result.map_or(point_box, |r| r.merged(&point_box)));
        }
        result.unwrap_or(*self)
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a plane from raw `ax + by + cz + d` coefficients, normalizing them
    pub fn from_coefficients(coefficients: &Vec4) -> Self {
        let normal = Vec3::new(coefficients.x, coefficients.y, coefficients.z);
        let length = normal.norm();
        if length > f32::EPSILON {
            Self {
                normal: normal / length,
                distance: coefficients.w / length,
            }
        } else {
            Self {
                normal: Vec3::zeros(),
                distance: 0.0,
            }
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Six planes (left, right, bottom, top, near, far), normals pointing inwards
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix (Gribb-Hartmann)
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let row = |r: usize| Vec4::new(vp[(r, 0)], vp[(r, 1)], vp[(r, 2)], vp[(r, 3)]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        Self {
            planes: [
                Plane::from_coefficients(&(r3 + r0)),
                Plane::from_coefficients(&(r3 - r0)),
                Plane::from_coefficients(&(r3 + r1)),
                Plane::from_coefficients(&(r3 - r1)),
                Plane::from_coefficients(&(r3 + r2)),
                Plane::from_coefficients(&(r3 - r2)),
            ],
        }
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // Corner of the box furthest along the plane normal
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 {
                p.x = aabb.max.x;
            }
            if plane.normal.y >= 0.0 {
                p.y = aabb.max.y;
            }
            if plane.normal.z >= 0.0 {
                p.z = aabb.max.z;
            }
            if plane.distance_to_point(&p) < 0.0 {
                return false;
            }
        }
        true
    }
}

/// Math utility functions
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }

    /// Round `value` up to the next multiple of `alignment` (alignment > 0)
    pub const fn align_up(value: usize, alignment: usize) -> usize {
        value.div_ceil(alignment) * alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normal_matrix_of_uniform_scale_is_inverse_scale() {
        let world = Mat4::new_scaling(2.0);
        let normal = normal_matrix(&world);
        assert_relative_eq!(normal, Mat3::identity() * 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_compose_trs_translation() {
        let m = compose_trs(
            &Vec3::new(1.0, 2.0, 3.0),
            &Quat::identity(),
            &Vec3::new(1.0, 1.0, 1.0),
        );
        assert_relative_eq!(world_position(&m), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_aabb_from_positions() {
        let aabb = Aabb::from_positions(&[0.0, 1.0, 2.0, -1.0, 5.0, 0.5]).unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, 1.0, 0.5));
        assert_eq!(aabb.max, Vec3::new(0.0, 5.0, 2.0));
        assert!(Aabb::from_positions(&[]).is_none());
    }

    #[test]
    fn test_frustum_culls_box_behind_camera() {
        let projection = Mat4::new_perspective(1.0, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(
            &Point3::new(0.0, 0.0, 5.0),
            &Point3::origin(),
            &Vec3::y(),
        );
        let frustum = Frustum::from_view_projection(&(projection * view));

        let in_front = Aabb::new(Vec3::new(-0.5, -0.5, -0.5), Vec3::new(0.5, 0.5, 0.5));
        let behind = Aabb::new(Vec3::new(-0.5, -0.5, 9.5), Vec3::new(0.5, 0.5, 10.5));
        assert!(frustum.intersects_aabb(&in_front));
        assert!(!frustum.intersects_aabb(&behind));
    }

    #[test]
    fn test_view_depth_positive_in_front() {
        let view = Mat4::look_at_rh(&Point3::new(0.0, 0.0, 5.0), &Point3::origin(), &Vec3::y());
        assert_relative_eq!(view_depth(&view, &Vec3::zeros()), 5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(utils::align_up(0, 16), 0);
        assert_eq!(utils::align_up(1, 16), 16);
        assert_eq!(utils::align_up(36, 16), 48);
        assert_eq!(utils::align_up(64, 16), 64);
    }
}
