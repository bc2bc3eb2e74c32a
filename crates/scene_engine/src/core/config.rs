//! # Engine Configuration
//!
//! All knobs the engine reads at construction time: which rendering strategy
//! to drive, how large each shared buffer is, the data texture grid and the
//! per-subsystem instance limits.
//!
//! ## Loading
//!
//! `EngineConfig` implements [`Config`], so it can be read from `.toml` or
//! `.ron` files. Every section has defaults, so partial files are fine:
//!
//! ```toml
//! log_level = "debug"
//! strategy = "DataTexture"
//!
//! [data_texture]
//! width = 512
//! height = 512
//! ```

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};
use crate::memory::BufferUse;

/// Rendering strategy selected once at engine construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StrategyKind {
    /// Per-draw uniform upload with CPU culling
    Uniform,
    /// Whole instance buffer packed into a float texture ("fastest" path)
    #[default]
    DataTexture,
    /// Storage buffer and bind group path
    WebGpu,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uniform => write!(f, "uniform"),
            Self::DataTexture => write!(f, "data-texture"),
            Self::WebGpu => write!(f, "webgpu"),
        }
    }
}

/// Byte capacity of each shared buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferCapacities {
    /// CPU-only component members (transforms, camera parameters)
    pub cpu_generic: usize,
    /// Per-instance data mirrored to the GPU every frame
    pub gpu_instance_data: usize,
    /// Vertex attributes and morph targets
    pub gpu_vertex_data: usize,
    /// Uniform-block staging
    pub ubo_generic: usize,
}

impl BufferCapacities {
    /// Capacity of the buffer backing `usage`
    pub const fn capacity_of(&self, usage: BufferUse) -> usize {
        match usage {
            BufferUse::CpuGeneric => self.cpu_generic,
            BufferUse::GpuInstanceData => self.gpu_instance_data,
            BufferUse::GpuVertexData => self.gpu_vertex_data,
            BufferUse::UboGeneric => self.ubo_generic,
        }
    }
}

impl Default for BufferCapacities {
    fn default() -> Self {
        Self {
            cpu_generic: 4 * 1024 * 1024,
            gpu_instance_data: 8 * 1024 * 1024,
            gpu_vertex_data: 4 * 1024 * 1024,
            ubo_generic: 64 * 1024,
        }
    }
}

/// Data texture grid used by the data texture strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataTextureConfig {
    /// Texels per row
    pub width: usize,
    /// Number of rows
    pub height: usize,
    /// Serve the first vec4s of instance data from a uniform block
    pub use_uniform_block: bool,
    /// Size of that uniform block in vec4s
    pub max_uniform_block_vec4s: usize,
}

impl DataTextureConfig {
    /// Total payload the grid can hold (RGBA32F texels)
    pub const fn capacity_bytes(&self) -> usize {
        self.width * self.height * 16
    }

    /// Set grid dimensions
    pub const fn with_size(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable the uniform block prefix
    pub const fn with_uniform_block(mut self, max_vec4s: usize) -> Self {
        self.use_uniform_block = true;
        self.max_uniform_block_vec4s = max_vec4s;
        self
    }
}

impl Default for DataTextureConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            use_uniform_block: false,
            max_uniform_block_vec4s: 1024,
        }
    }
}

/// Per-subsystem instance limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    /// Components of one type packed into a single buffer view
    pub max_components_per_view: usize,
    /// Camera slots in the global view/projection arrays
    pub max_cameras: usize,
    /// Light slots in the global light arrays
    pub max_lights: usize,
    /// Bone matrices per skeleton
    pub max_bones_per_skeleton: usize,
    /// Skeleton slots in the global bone array
    pub max_skeletons: usize,
    /// Instances per material type
    pub max_material_instances: usize,
    /// Array length used when a semantic leaves it unspecified
    pub default_array_length: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_components_per_view: 1024,
            max_cameras: 16,
            max_lights: 8,
            max_bones_per_skeleton: 100,
            max_skeletons: 4,
            max_material_instances: 64,
            default_array_length: 100,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter used by binaries that call `logging::init_with_level`
    pub log_level: String,
    /// Rendering strategy
    pub strategy: StrategyKind,
    /// Shared buffer sizes
    pub buffers: BufferCapacities,
    /// Data texture grid
    pub data_texture: DataTextureConfig,
    /// Instance limits
    pub limits: EngineLimits,
}

impl EngineConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            strategy: StrategyKind::default(),
            buffers: BufferCapacities::default(),
            data_texture: DataTextureConfig::default(),
            limits: EngineLimits::default(),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Select the rendering strategy
    pub const fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace buffer capacities
    pub const fn with_buffers(mut self, buffers: BufferCapacities) -> Self {
        self.buffers = buffers;
        self
    }

    /// Replace the data texture grid
    pub const fn with_data_texture(mut self, data_texture: DataTextureConfig) -> Self {
        self.data_texture = data_texture;
        self
    }

    /// Replace instance limits
    pub const fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Validate the configuration
    ///
    /// Zero sizes are rejected. A data texture that cannot hold both shared GPU
    /// buffers at full capacity only produces a warning, since the buffers are
    /// rarely filled completely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let buffers = &self.buffers;
        for (name, value) in [
            ("buffers.cpu_generic", buffers.cpu_generic),
            ("buffers.gpu_instance_data", buffers.gpu_instance_data),
            ("buffers.gpu_vertex_data", buffers.gpu_vertex_data),
            ("buffers.ubo_generic", buffers.ubo_generic),
            ("data_texture.width", self.data_texture.width),
            ("data_texture.height", self.data_texture.height),
            ("limits.max_components_per_view", self.limits.max_components_per_view),
            ("limits.max_cameras", self.limits.max_cameras),
            ("limits.max_lights", self.limits.max_lights),
            ("limits.max_bones_per_skeleton", self.limits.max_bones_per_skeleton),
            ("limits.max_skeletons", self.limits.max_skeletons),
            ("limits.max_material_instances", self.limits.max_material_instances),
            ("limits.default_array_length", self.limits.default_array_length),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }

        if self.data_texture.use_uniform_block && self.data_texture.max_uniform_block_vec4s == 0 {
            return Err(ConfigError::Invalid(
                "data_texture.max_uniform_block_vec4s must be greater than zero \
                 when the uniform block is enabled"
                    .to_string(),
            ));
        }

        let texture_bytes = self.data_texture.capacity_bytes();
        let gpu_bytes = buffers.gpu_instance_data + buffers.gpu_vertex_data;
        if gpu_bytes > texture_bytes {
            log::warn!(
                "Data texture {}x{} holds {} bytes but GPU buffers may grow to {} bytes",
                self.data_texture.width,
                self.data_texture.height,
                texture_bytes,
                gpu_bytes
            );
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_texture_width_rejected() {
        let config = EngineConfig::new()
            .with_data_texture(DataTextureConfig::default().with_size(0, 16));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            strategy = "WebGpu"

            [data_texture]
            width = 64
            height = 32
        "#;
        let config = EngineConfig::from_str_as(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.strategy, StrategyKind::WebGpu);
        assert_eq!(config.data_texture.width, 64);
        assert_eq!(config.data_texture.height, 32);
        assert_eq!(config.limits, EngineLimits::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_ron_round_trip() {
        let config = EngineConfig::new()
            .with_strategy(StrategyKind::Uniform)
            .with_log_level("debug");
        let text = config.to_string_as(ConfigFormat::Ron).unwrap();
        let parsed = EngineConfig::from_str_as(&text, ConfigFormat::Ron).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = EngineConfig::load_from_file("engine.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
