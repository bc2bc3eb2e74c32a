//! Data texture packing
//!
//! The data texture is a fixed `width × height` grid of RGBA32F texels whose
//! payload is `[instance data][padding to a texel][vertex/morph data]`. Texel
//! `i` of the instance region holds vec4 `i` of the instance buffer, so the
//! vec4 offsets baked into generated shaders address the texture directly.

use crate::core::DataTextureConfig;
use crate::foundation::math::utils::align_up;

use super::{RenderError, RenderResult};

/// Bytes in one RGBA32F texel
pub const TEXEL_BYTES: usize = 16;

/// Placement of both payloads inside the texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataTextureLayout {
    width: usize,
    height: usize,
    instance_bytes: usize,
    padding: usize,
    vertex_bytes: usize,
    uniform_block_vec4s: usize,
}

/// What the strategy uploads this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTexturePlan {
    /// Both payloads fit
    Full(DataTextureLayout),
    /// Instance data fits, vertex/morph data was dropped
    WithoutVertexData(DataTextureLayout),
    /// Nothing fits; skip the upload and the frame's draws
    Skip {
        /// Bytes the instance data alone needs
        required: usize,
        /// Bytes the grid holds
        capacity: usize,
    },
}

impl DataTexturePlan {
    /// Layout to upload, if any
    pub const fn layout(&self) -> Option<&DataTextureLayout> {
        match self {
            Self::Full(layout) | Self::WithoutVertexData(layout) => Some(layout),
            Self::Skip { .. } => None,
        }
    }
}

impl DataTextureLayout {
    /// Layout for `instance_bytes` of instance data followed by `vertex_bytes`
    ///
    /// Fails with [`RenderError::DataTextureOverflow`] when the payload does
    /// not fit the grid.
    pub fn compute(
        config: &DataTextureConfig,
        instance_bytes: usize,
        vertex_bytes: usize,
    ) -> RenderResult<Self> {
        let padding = align_up(instance_bytes, TEXEL_BYTES) - instance_bytes;
        let required = instance_bytes + padding + vertex_bytes;
        let capacity = config.capacity_bytes();
        if required > capacity {
            return Err(RenderError::DataTextureOverflow { required, capacity });
        }
        let uniform_block_vec4s = if config.use_uniform_block {
            config.max_uniform_block_vec4s
        } else {
            0
        };
        Ok(Self {
            width: config.width,
            height: config.height,
            instance_bytes,
            padding,
            vertex_bytes,
            uniform_block_vec4s,
        })
    }

    /// Decide what to upload, shrinking the payload when it overflows
    ///
    /// Every shrink is logged as a warning.
    pub fn plan(
        config: &DataTextureConfig,
        instance_bytes: usize,
        vertex_bytes: usize,
    ) -> DataTexturePlan {
        match Self::compute(config, instance_bytes, vertex_bytes) {
            Ok(layout) => DataTexturePlan::Full(layout),
            Err(RenderError::DataTextureOverflow { required, capacity }) => {
                log::warn!(
                    "Data texture overflow: {} bytes needed, {} available; dropping vertex data",
                    required,
                    capacity
                );
                match Self::compute(config, instance_bytes, 0) {
                    Ok(layout) => DataTexturePlan::WithoutVertexData(layout),
                    Err(_) => {
                        let required = align_up(instance_bytes, TEXEL_BYTES);
                        log::warn!(
                            "Data texture overflow: {} instance bytes, {} available; skipping",
                            required,
                            capacity
                        );
                        DataTexturePlan::Skip { required, capacity }
                    }
                }
            }
            Err(_) => DataTexturePlan::Skip {
                required: instance_bytes + vertex_bytes,
                capacity: config.capacity_bytes(),
            },
        }
    }

    /// Texels per row
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Rows in the grid
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Instance region length
    pub const fn instance_bytes(&self) -> usize {
        self.instance_bytes
    }

    /// Bytes between the instance region and the vertex region
    pub const fn padding(&self) -> usize {
        self.padding
    }

    /// Vertex/morph region length
    pub const fn vertex_bytes(&self) -> usize {
        self.vertex_bytes
    }

    /// Payload length: instance data, padding and vertex data
    pub const fn payload_bytes(&self) -> usize {
        self.instance_bytes + self.padding + self.vertex_bytes
    }

    /// Payload length without the vertex/morph region
    pub const fn total_size_except_vertex_data(&self) -> usize {
        self.instance_bytes + self.padding
    }

    /// Texel where the vertex/morph region starts
    pub const fn vertex_texel_offset(&self) -> usize {
        self.total_size_except_vertex_data() / TEXEL_BYTES
    }

    /// Bytes the grid holds
    pub const fn capacity_bytes(&self) -> usize {
        self.width * self.height * TEXEL_BYTES
    }

    /// Rows touched by the payload
    pub const fn rows(&self) -> usize {
        let row_bytes = self.width * TEXEL_BYTES;
        if row_bytes == 0 {
            0
        } else {
            self.payload_bytes().div_ceil(row_bytes)
        }
    }

    /// Size of the uniform block in vec4s (0 when disabled)
    ///
    /// Fixed by configuration so generated shaders stay valid while the
    /// instance data grows; entries past the instance data are zero.
    pub const fn uniform_block_vec4s(&self) -> usize {
        self.uniform_block_vec4s
    }

    /// Whether a new layout needs the texture recreated
    ///
    /// Growing past the uploaded rows or switching the split point both
    /// invalidate addressing; the texture is then deleted and rebuilt.
    pub fn requires_recreate(&self, other: &DataTextureLayout) -> bool {
        self.width != other.width
            || self.height != other.height
            || self.total_size_except_vertex_data() != other.total_size_except_vertex_data()
    }

    /// Pack both regions into whole rows of floats ready for upload
    ///
    /// Input slices longer than the layout's regions are truncated; shorter
    /// ones are zero filled.
    pub fn pack(&self, instance_words: &[f32], vertex_words: &[f32]) -> Vec<f32> {
        let mut payload = vec![0.0f32; self.rows() * self.width * 4];
        let instance_len = (self.instance_bytes / 4).min(instance_words.len());
        payload[..instance_len].copy_from_slice(&instance_words[..instance_len]);

        let vertex_start = self.total_size_except_vertex_data() / 4;
        let vertex_len = (self.vertex_bytes / 4).min(vertex_words.len());
        payload[vertex_start..vertex_start + vertex_len]
            .copy_from_slice(&vertex_words[..vertex_len]);
        payload
    }

    /// Leading vec4s of the instance buffer for the uniform block
    pub fn uniform_block_words(&self, instance_words: &[f32]) -> Vec<f32> {
        let mut words = vec![0.0f32; self.uniform_block_vec4s * 4];
        let len = words.len().min(instance_words.len());
        words[..len].copy_from_slice(&instance_words[..len]);
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(width: usize, height: usize) -> DataTextureConfig {
        DataTextureConfig::default().with_size(width, height)
    }

    #[test]
    fn test_payload_is_instance_padding_vertex() {
        let layout = DataTextureLayout::compute(&config(4, 4), 36, 24).unwrap();
        assert_eq!(layout.padding(), 12);
        assert_eq!(layout.payload_bytes(), 36 + 12 + 24);
        assert!(layout.payload_bytes() <= 4 * 4 * 4 * 4);
        assert_eq!(layout.vertex_texel_offset(), 3);
        assert_eq!(layout.rows(), 2);
    }

    #[test]
    fn test_aligned_instance_data_has_no_padding() {
        let layout = DataTextureLayout::compute(&config(8, 8), 64, 0).unwrap();
        assert_eq!(layout.padding(), 0);
        assert_eq!(layout.payload_bytes(), 64);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let err = DataTextureLayout::compute(&config(2, 2), 48, 32).unwrap_err();
        assert_eq!(
            err,
            RenderError::DataTextureOverflow {
                required: 80,
                capacity: 64
            }
        );
    }

    #[test]
    fn test_plan_shrinks_then_skips() {
        assert!(matches!(
            DataTextureLayout::plan(&config(2, 2), 32, 16),
            DataTexturePlan::Full(_)
        ));
        match DataTextureLayout::plan(&config(2, 2), 48, 32) {
            DataTexturePlan::WithoutVertexData(layout) => assert_eq!(layout.vertex_bytes(), 0),
            other => panic!("unexpected plan {other:?}"),
        }
        assert_eq!(
            DataTextureLayout::plan(&config(2, 2), 80, 0),
            DataTexturePlan::Skip {
                required: 80,
                capacity: 64
            }
        );
    }

    #[test]
    fn test_pack_places_vertex_data_after_padding() {
        let layout = DataTextureLayout::compute(&config(2, 2), 8, 8).unwrap();
        let packed = layout.pack(&[1.0, 2.0], &[3.0, 4.0]);
        assert_eq!(packed.len(), 8);
        assert_eq!(&packed[..6], &[1.0, 2.0, 0.0, 0.0, 3.0, 4.0]);
    }

    #[test]
    fn test_uniform_block_prefix() {
        let config = config(4, 4).with_uniform_block(2);
        let layout = DataTextureLayout::compute(&config, 64, 0).unwrap();
        assert_eq!(layout.uniform_block_vec4s(), 2);
        let words: Vec<f32> = (0..16).map(|i| i as f32).collect();
        assert_eq!(layout.uniform_block_words(&words), words[..8].to_vec());

        let small = DataTextureLayout::compute(&config, 16, 0).unwrap();
        assert_eq!(small.uniform_block_words(&[1.0, 2.0, 3.0, 4.0])[4..], [0.0; 4]);
    }
}
