//! Narrow graphics device contract used by the rendering strategies
//!
//! The strategies only need programs, a handful of buffer kinds, one float
//! texture, bind groups for the storage path, uniforms and draws. Anything
//! that implements [`CgApi`] can host them; [`RecordingCgApi`] does so
//! headlessly.
//!
//! [`RecordingCgApi`]: super::RecordingCgApi

use crate::foundation::collections::new_key_type;
use crate::foundation::math::{Mat3, Mat4};

use super::RenderResult;

new_key_type! {
    /// Handle to a linked shader program
    pub struct ProgramHandle;
    /// Handle to a GPU buffer
    pub struct BufferHandle;
    /// Handle to a float RGBA texture
    pub struct TextureHandle;
    /// Handle to a bind group
    pub struct BindGroupHandle;
}

/// What a buffer is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-vertex attributes
    Vertex,
    /// 32-bit indices
    Index,
    /// Uniform block
    Uniform,
    /// Read-only storage buffer
    Storage,
}

/// Uniform payloads
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// `float`
    Float(f32),
    /// `int`
    Int(i32),
    /// `vec4`
    Vec4([f32; 4]),
    /// `mat3`
    Mat3(Mat3),
    /// `mat4`
    Mat4(Mat4),
    /// `float[]`
    FloatArray(Vec<f32>),
    /// `int[]`
    IntArray(Vec<i32>),
}

/// One entry of a bind group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    /// Buffer at a binding index
    Buffer {
        /// Binding index
        binding: u32,
        /// Bound buffer
        buffer: BufferHandle,
    },
    /// Texture at a binding index
    Texture {
        /// Binding index
        binding: u32,
        /// Bound texture
        texture: TextureHandle,
    },
}

/// A draw request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// Indices (or vertices when not indexed) to draw
    pub element_count: u32,
    /// Whether the bound index buffer is used
    pub indexed: bool,
    /// Instances to draw
    pub instance_count: u32,
    /// First instance id seen by the shader
    pub first_instance: u32,
}

/// Device operations the rendering strategies issue
pub trait CgApi {
    /// Compile and link a program
    fn create_program(
        &mut self,
        label: &str,
        vertex: &str,
        fragment: &str,
    ) -> RenderResult<ProgramHandle>;

    /// Delete a program
    fn delete_program(&mut self, program: ProgramHandle);

    /// Make a program current
    fn use_program(&mut self, program: ProgramHandle);

    /// Create a buffer holding `data`
    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> RenderResult<BufferHandle>;

    /// Overwrite part of a buffer
    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        byte_offset: usize,
        data: &[u8],
    ) -> RenderResult<()>;

    /// Delete a buffer
    fn delete_buffer(&mut self, buffer: BufferHandle);

    /// Create a `width x height` RGBA32F texture filled with zeros
    fn create_float_texture(&mut self, width: usize, height: usize) -> RenderResult<TextureHandle>;

    /// Upload texels row by row starting at texel row `first_row`
    ///
    /// `texels` holds four floats per texel; a partial last row is allowed.
    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        first_row: usize,
        texels: &[f32],
    ) -> RenderResult<()>;

    /// Delete a texture
    fn delete_texture(&mut self, texture: TextureHandle);

    /// Bind a texture to a texture unit
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);

    /// Create a bind group for a program
    fn create_bind_group(
        &mut self,
        program: ProgramHandle,
        entries: &[BindingResource],
    ) -> RenderResult<BindGroupHandle>;

    /// Bind a bind group at a group index
    fn set_bind_group(&mut self, index: u32, group: BindGroupHandle);

    /// Set a uniform of the current program
    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: &UniformValue);

    /// Bind vertex and (optional) index buffers
    fn bind_vertex_buffers(&mut self, vertex: &[BufferHandle], index: Option<BufferHandle>);

    /// Issue a draw
    fn draw(&mut self, call: DrawCall);
}
