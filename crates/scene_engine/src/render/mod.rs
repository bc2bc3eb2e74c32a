//! # Rendering
//!
//! Turns the shared component memory into GPU work through one of three
//! interchangeable upload strategies.
//!
//! ## Structure
//!
//! ```text
//! RenderingStrategy (Uniform | DataTexture | WebGpu)
//!  ├── shader_property   generated getters addressing instance memory
//!  ├── DataTextureLayout [instance][pad][vertex/morph] texel packing
//!  └── CgApi             narrow device contract (RecordingCgApi headless)
//! ```
//!
//! Meshes, primitives and materials are the minimal collaborators the
//! strategies need: vertex accessors, sort keys, alpha mode and per-material
//! property blocks in instance memory.

pub mod cg_api;
pub mod data_texture;
pub mod draw_list;
pub mod material;
pub mod mesh;
pub mod recording;
pub mod render_pass;
pub mod shader_property;
pub mod strategy;

#[cfg(test)]
mod tests;

pub use cg_api::{
    BindGroupHandle, BindingResource, BufferHandle, BufferKind, CgApi, DrawCall, ProgramHandle,
    TextureHandle, UniformValue,
};
pub use data_texture::{DataTextureLayout, DataTexturePlan};
pub use draw_list::{sort_draw_items, DrawItem};
pub use material::{
    AlphaMode, Material, MaterialRepository, MaterialType, MaterialUid, ShaderSource,
};
pub use mesh::{
    Mesh, MeshRepository, MeshUid, Primitive, PrimitiveDesc, PrimitiveMode, PrimitiveUid,
};
pub use recording::{CgCommand, RecordingCgApi};
pub use render_pass::{RenderPass, RenderPassUid};
pub use strategy::{CgApiStrategy, RenderingStrategy, StrategyContext};

use crate::ecs::EcsError;
use crate::memory::MemoryError;

/// Errors that can occur during rendering operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Shader program could not be created
    ///
    /// Recovered locally: the material falls back to its last working shader
    /// source and the program is created once more.
    #[error("Shader program creation failed for {material_type}: {reason}")]
    ShaderProgramFailed {
        /// Material type whose program failed
        material_type: String,
        /// Backend message
        reason: String,
    },

    /// Instance and vertex data do not fit the data texture grid
    ///
    /// The strategy first drops the vertex/morph payload; when the instance
    /// data alone still does not fit, the upload and the frame's draws are
    /// skipped.
    #[error("Data texture overflow: {required} bytes needed, {capacity} available")]
    DataTextureOverflow {
        /// Bytes the payload needs
        required: usize,
        /// Bytes the texture holds
        capacity: usize,
    },

    /// No mesh with this UID
    #[error("Missing mesh: {0:?}")]
    MissingMesh(MeshUid),

    /// No primitive with this UID
    #[error("Missing primitive: {0:?}")]
    MissingPrimitive(PrimitiveUid),

    /// Unknown material or material type
    #[error("Missing material: {0}")]
    MissingMaterial(String),

    /// Material type registered twice
    #[error("Material type already registered: {0}")]
    DuplicateMaterialType(String),

    /// Every instance of a material type is in use
    #[error("Material type {name} has no free instance (max {max_instances})")]
    MaterialCapacityExceeded {
        /// Material type
        name: String,
        /// Configured maximum
        max_instances: usize,
    },

    /// GPU resource creation failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Backend-specific error occurred
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Component memory failure
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Component access failure
    #[error("ECS error: {0}")]
    Ecs(#[from] EcsError),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
