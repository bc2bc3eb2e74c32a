//! vec4/scalar addressing of properties in instance memory
//!
//! The CPU packer and every shader generator go through these types, so a
//! property is addressed the same way on both sides:
//!
//! * aligned layouts:
//!   `vec4_idx = offset + vec4_per_instance * instance [+ vec4_size * array_index]`
//! * packed arrays:
//!   `scalar_idx = offset * 4 + 4 * vec4_per_instance * instance + n * array_index`
//!
//! A component type whose instances spill over several buffer views has one
//! [`LocationChunk`] per view; instance ids are resolved chunk by chunk.

use super::composition::{aligned_byte_length, CompositionType};

/// Shape of one property instance in 16-byte addressed memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyLayout {
    /// Composition of the property
    pub composition_type: CompositionType,
    /// Entries per instance (1 for non-array compositions)
    pub array_length: usize,
}

impl PropertyLayout {
    /// Layout of `composition`, arrays holding `array_length` entries
    pub const fn new(composition_type: CompositionType, array_length: usize) -> Self {
        Self {
            composition_type,
            array_length: if composition_type.is_array() {
                array_length
            } else {
                1
            },
        }
    }

    /// Floats per entry
    pub const fn number_of_components(&self) -> usize {
        self.composition_type.number_of_components()
    }

    /// vec4s one entry spans
    pub const fn vec4_size(&self) -> usize {
        self.composition_type.vec4_size_of_element()
    }

    /// Whether entries are addressed as scalars
    pub const fn is_packed(&self) -> bool {
        self.composition_type.is_packed_array()
    }

    /// Bytes one instance occupies
    pub const fn aligned_byte_length(&self) -> usize {
        aligned_byte_length(self.composition_type, self.array_length)
    }

    /// vec4s one instance occupies
    pub const fn vec4_per_instance(&self) -> usize {
        self.aligned_byte_length() / 16
    }
}

/// Run of consecutive instances stored contiguously
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocationChunk {
    /// Start of the run in vec4 units from the start of instance memory
    pub vec4_offset: usize,
    /// Instances in the run
    pub instance_count: usize,
}

/// Where every instance of a property lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyLocation {
    /// Shape of one instance
    pub layout: PropertyLayout,
    /// Contiguous runs, in instance id order
    pub chunks: Vec<LocationChunk>,
}

impl PropertyLocation {
    /// Single contiguous run
    pub fn single(layout: PropertyLayout, vec4_offset: usize, instance_count: usize) -> Self {
        Self {
            layout,
            chunks: vec![LocationChunk {
                vec4_offset,
                instance_count,
            }],
        }
    }

    /// Several runs (one per buffer view)
    pub const fn from_chunks(layout: PropertyLayout, chunks: Vec<LocationChunk>) -> Self {
        Self { layout, chunks }
    }

    /// Offset of the first run in vec4 units
    pub fn vec4_offset(&self) -> usize {
        self.chunks.first().map_or(0, |chunk| chunk.vec4_offset)
    }

    /// Total instances addressable
    pub fn instance_count(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.instance_count).sum()
    }

    /// Chunk offset and index inside the chunk for a global instance id
    pub fn resolve(&self, instance_id: usize) -> Option<(usize, usize)> {
        let mut local = instance_id;
        for chunk in &self.chunks {
            if local < chunk.instance_count {
                return Some((chunk.vec4_offset, local));
            }
            local -= chunk.instance_count;
        }
        None
    }

    /// vec4 index of an entry (the first of its vec4s for matrices)
    ///
    /// For packed arrays this is the texel holding the entry's first scalar.
    pub fn vec4_index(&self, instance_id: usize, array_index: usize) -> Option<usize> {
        if self.layout.is_packed() {
            return self.scalar_index(instance_id, array_index).map(|i| i / 4);
        }
        if array_index >= self.layout.array_length {
            return None;
        }
        let (offset, local) = self.resolve(instance_id)?;
        Some(
            offset
                + self.layout.vec4_per_instance() * local
                + self.layout.vec4_size() * array_index,
        )
    }

    /// Scalar (float) index of an entry's first component
    pub fn scalar_index(&self, instance_id: usize, array_index: usize) -> Option<usize> {
        if array_index >= self.layout.array_length {
            return None;
        }
        if !self.layout.is_packed() {
            return self.vec4_index(instance_id, array_index).map(|i| i * 4);
        }
        let (offset, local) = self.resolve(instance_id)?;
        Some(
            offset * 4
                + 4 * self.layout.vec4_per_instance() * local
                + self.layout.number_of_components() * array_index,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat4_vec4_index() {
        let layout = PropertyLayout::new(CompositionType::Mat4, 1);
        let location = PropertyLocation::single(layout, 10, 8);
        assert_eq!(location.vec4_index(0, 0), Some(10));
        assert_eq!(location.vec4_index(3, 0), Some(22));
        assert_eq!(location.vec4_index(8, 0), None);
    }

    #[test]
    fn test_mat3_instances_span_three_vec4s() {
        let layout = PropertyLayout::new(CompositionType::Mat3, 1);
        let location = PropertyLocation::single(layout, 0, 4);
        assert_eq!(location.layout.vec4_per_instance(), 3);
        assert_eq!(location.vec4_index(2, 0), Some(6));
    }

    #[test]
    fn test_packed_vec3_array_scalar_index() {
        let layout = PropertyLayout::new(CompositionType::Vec3Array, 4);
        // 4 * 12 = 48 bytes -> 3 vec4s per instance
        assert_eq!(layout.vec4_per_instance(), 3);
        let location = PropertyLocation::single(layout, 5, 2);
        assert_eq!(location.scalar_index(0, 0), Some(20));
        assert_eq!(location.scalar_index(0, 3), Some(29));
        assert_eq!(location.scalar_index(1, 1), Some(20 + 12 + 3));
        assert_eq!(location.scalar_index(0, 4), None);
    }

    #[test]
    fn test_aligned_array_vec4_index() {
        let layout = PropertyLayout::new(CompositionType::Mat4Array, 3);
        let location = PropertyLocation::single(layout, 0, 2);
        assert_eq!(location.vec4_index(1, 2), Some(12 + 8));
    }

    #[test]
    fn test_multiple_chunks() {
        let layout = PropertyLayout::new(CompositionType::Vec4, 1);
        let location = PropertyLocation::from_chunks(
            layout,
            vec![
                LocationChunk {
                    vec4_offset: 0,
                    instance_count: 2,
                },
                LocationChunk {
                    vec4_offset: 100,
                    instance_count: 2,
                },
            ],
        );
        assert_eq!(location.vec4_index(1, 0), Some(1));
        assert_eq!(location.vec4_index(2, 0), Some(100));
        assert_eq!(location.vec4_index(3, 0), Some(101));
        assert_eq!(location.instance_count(), 4);
    }

    #[test]
    fn test_offsets_are_deterministic() {
        let all = [
            CompositionType::Scalar,
            CompositionType::Vec2,
            CompositionType::Vec3,
            CompositionType::Vec4,
            CompositionType::Mat2,
            CompositionType::Mat3,
            CompositionType::Mat4,
            CompositionType::ScalarArray,
            CompositionType::Vec2Array,
            CompositionType::Vec3Array,
            CompositionType::Vec4Array,
            CompositionType::Mat2Array,
            CompositionType::Mat3Array,
            CompositionType::Mat4Array,
        ];
        for composition in all {
            let a = PropertyLocation::single(PropertyLayout::new(composition, 5), 7, 3);
            let b = PropertyLocation::single(PropertyLayout::new(composition, 5), 7, 3);
            for instance in 0..3 {
                let entries = if composition.is_array() { 5 } else { 1 };
                for entry in 0..entries {
                    assert_eq!(a.scalar_index(instance, entry), b.scalar_index(instance, entry));
                    assert!(a.scalar_index(instance, entry).is_some());
                }
            }
        }
    }
}
