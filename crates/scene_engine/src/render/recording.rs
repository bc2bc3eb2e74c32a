//! Headless [`CgApi`] that records every call
//!
//! Keeps the payload of every buffer and texture it was given so tests and
//! the demo can inspect what a real device would have received. Program
//! creation can be made to fail to exercise the shader fallback path.

use crate::foundation::collections::SlotMap;

use super::cg_api::{
    BindGroupHandle, BindingResource, BufferHandle, BufferKind, CgApi, DrawCall, ProgramHandle,
    TextureHandle, UniformValue,
};
use super::{RenderError, RenderResult};

/// A recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum CgCommand {
    /// Program created
    CreateProgram(ProgramHandle),
    /// Program deleted
    DeleteProgram(ProgramHandle),
    /// Program made current
    UseProgram(ProgramHandle),
    /// Buffer created with its byte size
    CreateBuffer(BufferHandle, BufferKind, usize),
    /// Bytes written to a buffer
    WriteBuffer(BufferHandle, usize, usize),
    /// Buffer deleted
    DeleteBuffer(BufferHandle),
    /// Texture created with its size
    CreateTexture(TextureHandle, usize, usize),
    /// Texels uploaded starting at a row
    UploadTexture(TextureHandle, usize, usize),
    /// Texture deleted
    DeleteTexture(TextureHandle),
    /// Texture bound to a unit
    BindTexture(u32, TextureHandle),
    /// Bind group created
    CreateBindGroup(BindGroupHandle),
    /// Bind group bound
    SetBindGroup(u32, BindGroupHandle),
    /// Uniform set
    SetUniform(String, UniformValue),
    /// Vertex buffers bound
    BindVertexBuffers(usize, Option<BufferHandle>),
    /// Draw issued
    Draw(DrawCall),
}

/// Source and state of a recorded program
#[derive(Debug, Clone)]
pub struct RecordedProgram {
    /// Label given at creation
    pub label: String,
    /// Vertex source
    pub vertex: String,
    /// Fragment source
    pub fragment: String,
}

#[derive(Debug, Clone)]
struct RecordedTexture {
    width: usize,
    height: usize,
    texels: Vec<f32>,
}

#[derive(Debug, Clone)]
struct RecordedBuffer {
    kind: BufferKind,
    bytes: Vec<u8>,
}

/// Recording device
#[derive(Debug, Default)]
pub struct RecordingCgApi {
    programs: SlotMap<ProgramHandle, RecordedProgram>,
    buffers: SlotMap<BufferHandle, RecordedBuffer>,
    textures: SlotMap<TextureHandle, RecordedTexture>,
    bind_groups: SlotMap<BindGroupHandle, Vec<BindingResource>>,
    commands: Vec<CgCommand>,
    fail_programs_containing: Option<String>,
    current_program: Option<ProgramHandle>,
}

impl RecordingCgApi {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Make program creation fail when either source contains `marker`
    pub fn fail_programs_containing(&mut self, marker: impl Into<String>) {
        self.fail_programs_containing = Some(marker.into());
    }

    /// Stop simulating program failures
    pub fn clear_program_failures(&mut self) {
        self.fail_programs_containing = None;
    }

    /// Every call since the last [`RecordingCgApi::clear_commands`]
    pub fn commands(&self) -> &[CgCommand] {
        &self.commands
    }

    /// Forget recorded calls (resources are kept)
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Draw calls recorded
    pub fn draws(&self) -> Vec<DrawCall> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                CgCommand::Draw(call) => Some(*call),
                _ => None,
            })
            .collect()
    }

    /// Live program by handle
    pub fn program(&self, program: ProgramHandle) -> Option<&RecordedProgram> {
        self.programs.get(program)
    }

    /// Number of live programs
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Currently bound program
    pub const fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    /// Contents of a buffer
    pub fn buffer_bytes(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.bytes.as_slice())
    }

    /// Kind of a buffer
    pub fn buffer_kind(&self, buffer: BufferHandle) -> Option<BufferKind> {
        self.buffers.get(buffer).map(|b| b.kind)
    }

    /// Number of live buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Texels of a texture, four floats each, row-major
    pub fn texture_texels(&self, texture: TextureHandle) -> Option<&[f32]> {
        self.textures.get(texture).map(|t| t.texels.as_slice())
    }

    /// Size of a texture
    pub fn texture_size(&self, texture: TextureHandle) -> Option<(usize, usize)> {
        self.textures.get(texture).map(|t| (t.width, t.height))
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Handles of the live textures
    pub fn texture_handles(&self) -> Vec<TextureHandle> {
        self.textures.keys().collect()
    }

    /// Entries of a bind group
    pub fn bind_group(&self, group: BindGroupHandle) -> Option<&[BindingResource]> {
        self.bind_groups.get(group).map(Vec::as_slice)
    }

    /// Last value set for a uniform name
    pub fn last_uniform(&self, name: &str) -> Option<&UniformValue> {
        self.commands.iter().rev().find_map(|command| match command {
            CgCommand::SetUniform(n, value) if n == name => Some(value),
            _ => None,
        })
    }
}

impl CgApi for RecordingCgApi {
    fn create_program(
        &mut self,
        label: &str,
        vertex: &str,
        fragment: &str,
    ) -> RenderResult<ProgramHandle> {
        if let Some(marker) = &self.fail_programs_containing {
            if vertex.contains(marker.as_str()) || fragment.contains(marker.as_str()) {
                return Err(RenderError::ShaderProgramFailed {
                    material_type: label.to_string(),
                    reason: format!("simulated compile error at '{marker}'"),
                });
            }
        }
        let handle = self.programs.insert(RecordedProgram {
            label: label.to_string(),
            vertex: vertex.to_string(),
            fragment: fragment.to_string(),
        });
        self.commands.push(CgCommand::CreateProgram(handle));
        Ok(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(program).is_some() {
            if self.current_program == Some(program) {
                self.current_program = None;
            }
            self.commands.push(CgCommand::DeleteProgram(program));
        }
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
        self.commands.push(CgCommand::UseProgram(program));
    }

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> RenderResult<BufferHandle> {
        let handle = self.buffers.insert(RecordedBuffer {
            kind,
            bytes: data.to_vec(),
        });
        self.commands
            .push(CgCommand::CreateBuffer(handle, kind, data.len()));
        Ok(handle)
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        byte_offset: usize,
        data: &[u8],
    ) -> RenderResult<()> {
        let recorded = self
            .buffers
            .get_mut(buffer)
            .ok_or_else(|| {
                RenderError::BackendError(format!("write to deleted buffer {buffer:?}"))
            })?;
        let end = byte_offset + data.len();
        let size = recorded.bytes.len();
        let target = recorded.bytes.get_mut(byte_offset..end).ok_or_else(|| {
            RenderError::BackendError(format!("buffer write {byte_offset}..{end} past size {size}"))
        })?;
        target.copy_from_slice(data);
        self.commands
            .push(CgCommand::WriteBuffer(buffer, byte_offset, data.len()));
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(buffer).is_some() {
            self.commands.push(CgCommand::DeleteBuffer(buffer));
        }
    }

    fn create_float_texture(&mut self, width: usize, height: usize) -> RenderResult<TextureHandle> {
        if width == 0 || height == 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "texture size {width}x{height}"
            )));
        }
        let handle = self.textures.insert(RecordedTexture {
            width,
            height,
            texels: vec![0.0; width * height * 4],
        });
        self.commands
            .push(CgCommand::CreateTexture(handle, width, height));
        Ok(handle)
    }

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        first_row: usize,
        texels: &[f32],
    ) -> RenderResult<()> {
        let recorded = self
            .textures
            .get_mut(texture)
            .ok_or_else(|| {
                RenderError::BackendError(format!("upload to deleted texture {texture:?}"))
            })?;
        let (width, height) = (recorded.width, recorded.height);
        let start = first_row * width * 4;
        let end = start + texels.len();
        let target = recorded.texels.get_mut(start..end).ok_or_else(|| {
            RenderError::BackendError(format!(
                "texture upload of {} floats at row {first_row} exceeds {width}x{height}",
                texels.len()
            ))
        })?;
        target.copy_from_slice(texels);
        self.commands
            .push(CgCommand::UploadTexture(texture, first_row, texels.len() / 4));
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(texture).is_some() {
            self.commands.push(CgCommand::DeleteTexture(texture));
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.commands.push(CgCommand::BindTexture(unit, texture));
    }

    fn create_bind_group(
        &mut self,
        program: ProgramHandle,
        entries: &[BindingResource],
    ) -> RenderResult<BindGroupHandle> {
        if !self.programs.contains_key(program) {
            return Err(RenderError::ResourceCreationFailed(format!(
                "bind group for deleted program {program:?}"
            )));
        }
        let handle = self.bind_groups.insert(entries.to_vec());
        self.commands.push(CgCommand::CreateBindGroup(handle));
        Ok(handle)
    }

    fn set_bind_group(&mut self, index: u32, group: BindGroupHandle) {
        self.commands.push(CgCommand::SetBindGroup(index, group));
    }

    fn set_uniform(&mut self, _program: ProgramHandle, name: &str, value: &UniformValue) {
        self.commands
            .push(CgCommand::SetUniform(name.to_string(), value.clone()));
    }

    fn bind_vertex_buffers(&mut self, vertex: &[BufferHandle], index: Option<BufferHandle>) {
        self.commands
            .push(CgCommand::BindVertexBuffers(vertex.len(), index));
    }

    fn draw(&mut self, call: DrawCall) {
        self.commands.push(CgCommand::Draw(call));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_upload_lands_at_row() {
        let mut cg = RecordingCgApi::new();
        let texture = cg.create_float_texture(2, 2).unwrap();
        cg.upload_texture(texture, 1, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        let texels = cg.texture_texels(texture).unwrap();
        assert_eq!(&texels[8..12], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(&texels[0..4], &[0.0; 4]);
        assert!(cg.upload_texture(texture, 2, &[0.0; 4]).is_err());
    }

    #[test]
    fn test_simulated_program_failure() {
        let mut cg = RecordingCgApi::new();
        cg.fail_programs_containing("BROKEN");
        assert!(cg.create_program("m", "void main() { BROKEN }", "").is_err());
        assert!(cg.create_program("m", "void main() {}", "").is_ok());
        assert_eq!(cg.program_count(), 1);
    }

    #[test]
    fn test_buffer_write_bounds() {
        let mut cg = RecordingCgApi::new();
        let buffer = cg.create_buffer(BufferKind::Storage, &[0; 8]).unwrap();
        cg.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(cg.buffer_bytes(buffer).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(cg.write_buffer(buffer, 6, &[1, 2, 3]).is_err());
    }
}
