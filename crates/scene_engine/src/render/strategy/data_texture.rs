//! Data texture strategy
//!
//! The instance data buffer (followed by vertex/morph data) is packed into
//! one RGBA32F texture once per frame; generated getters fetch from it with
//! the same vec4 offsets the CPU wrote at. Optionally the leading vec4s are
//! also served from a uniform block.

use std::collections::HashMap;

use crate::core::{DataTextureConfig, StrategyKind};
use crate::ecs::components::MeshComponent;
use crate::global_data::ShaderSemanticsInfo;
use crate::memory::BufferUse;
use crate::render::cg_api::{
    BindGroupHandle, BindingResource, BufferHandle, BufferKind, CgApi, ProgramHandle,
    TextureHandle, UniformValue,
};
use crate::render::data_texture::{DataTextureLayout, DataTexturePlan, TEXEL_BYTES};
use crate::render::draw_list::DrawItem;
use crate::render::render_pass::RenderPass;
use crate::render::{RenderError, RenderResult};

use super::{
    draw_call, property_source, set_draw_uniforms, CgApiStrategy, ShaderDialect, StrategyContext,
    StrategyState,
};

/// Texture unit the data texture is bound to
const DATA_TEXTURE_UNIT: u32 = 0;

/// Data texture ("fastest") strategy
#[derive(Debug)]
pub struct DataTextureStrategy {
    pub(super) state: StrategyState,
    config: DataTextureConfig,
    is_webgl2: bool,
    texture: Option<TextureHandle>,
    layout: Option<DataTextureLayout>,
    uploaded_instance_version: Option<u64>,
    uploaded_vertex_version: Option<u64>,
    uniform_block: Option<BufferHandle>,
    uniform_block_groups: HashMap<ProgramHandle, BindGroupHandle>,
    skip_drawing: bool,
    vertex_data_dropped: bool,
    uploads: u64,
}

impl DataTextureStrategy {
    /// Strategy over a `config.width × config.height` grid
    pub fn new(config: DataTextureConfig) -> Self {
        Self {
            state: StrategyState::default(),
            config,
            is_webgl2: true,
            texture: None,
            layout: None,
            uploaded_instance_version: None,
            uploaded_vertex_version: None,
            uniform_block: None,
            uniform_block_groups: HashMap::new(),
            skip_drawing: false,
            vertex_data_dropped: false,
            uploads: 0,
        }
    }

    /// Generate WebGL1 (`texture2D`) or WebGL2 (`texelFetch`) getters
    pub const fn with_webgl2(mut self, is_webgl2: bool) -> Self {
        self.is_webgl2 = is_webgl2;
        self
    }

    /// Current texture
    pub const fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    /// Layout of the last upload
    pub const fn layout(&self) -> Option<&DataTextureLayout> {
        self.layout.as_ref()
    }

    /// Whether this frame's draws are skipped because nothing fit
    pub const fn is_skipping_draws(&self) -> bool {
        self.skip_drawing
    }

    /// Whether vertex/morph data was left out of the texture
    pub const fn vertex_data_dropped(&self) -> bool {
        self.vertex_data_dropped
    }

    /// Texture uploads issued so far
    pub const fn uploads(&self) -> u64 {
        self.uploads
    }

    fn release_texture(&mut self, cg: &mut dyn CgApi) {
        if let Some(texture) = self.texture.take() {
            cg.delete_texture(texture);
        }
        self.uploaded_instance_version = None;
        self.uploaded_vertex_version = None;
    }

    fn refresh_uniform_block(
        &mut self,
        cg: &mut dyn CgApi,
        layout: &DataTextureLayout,
        instance_words: &[f32],
    ) -> RenderResult<()> {
        let words = layout.uniform_block_words(instance_words);
        let bytes: &[u8] = bytemuck::cast_slice(&words);
        match self.uniform_block {
            Some(buffer) => cg.write_buffer(buffer, 0, bytes)?,
            None => {
                self.uniform_block = Some(cg.create_buffer(BufferKind::Uniform, bytes)?);
                self.uniform_block_groups.clear();
            }
        }
        Ok(())
    }

    fn bind_resources(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        program: ProgramHandle,
        texture: TextureHandle,
        layout: &DataTextureLayout,
    ) -> RenderResult<()> {
        ctx.cg.bind_texture(DATA_TEXTURE_UNIT, texture);
        ctx.cg
            .set_uniform(program, "u_dataTexture", &UniformValue::Int(DATA_TEXTURE_UNIT as i32));
        ctx.cg.set_uniform(
            program,
            "u_vertexDataOffset",
            &UniformValue::Int(layout.vertex_texel_offset() as i32),
        );
        if let Some(buffer) = self.uniform_block {
            let group = match self.uniform_block_groups.get(&program) {
                Some(group) => *group,
                None => {
                    let binding = BindingResource::Buffer { binding: 0, buffer };
                    let group = ctx.cg.create_bind_group(program, &[binding])?;
                    self.uniform_block_groups.insert(program, group);
                    group
                }
            };
            ctx.cg.set_bind_group(0, group);
        }
        Ok(())
    }

    fn dialect(&self, is_webgl2: bool) -> Option<ShaderDialect> {
        let layout = match self.layout {
            Some(layout) => layout,
            None => DataTextureLayout::compute(&self.config, 0, 0).ok()?,
        };
        Some(ShaderDialect::DataTextureGlsl { layout, is_webgl2 })
    }
}

impl CgApiStrategy for DataTextureStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DataTexture
    }

    fn load(&mut self, ctx: &mut StrategyContext<'_>, mesh: &MeshComponent) -> RenderResult<bool> {
        self.state.load_mesh(ctx, mesh)
    }

    /// Pack and upload the texture when the instance or vertex data changed
    ///
    /// Overflow shrinks the payload (see [`DataTextureLayout::plan`]); when
    /// even the instance data does not fit, the frame's draws are skipped
    /// and [`RenderError::DataTextureOverflow`] is returned.
    fn prerender(&mut self, ctx: &mut StrategyContext<'_>) -> RenderResult<()> {
        let instance = ctx.memory.buffer(BufferUse::GpuInstanceData);
        let vertex = ctx.memory.buffer(BufferUse::GpuVertexData);

        let layout = match DataTextureLayout::plan(
            &self.config,
            instance.taken_byte_index(),
            vertex.taken_byte_index(),
        ) {
            DataTexturePlan::Full(layout) => {
                self.vertex_data_dropped = false;
                layout
            }
            DataTexturePlan::WithoutVertexData(layout) => {
                self.vertex_data_dropped = true;
                layout
            }
            DataTexturePlan::Skip { required, capacity } => {
                self.skip_drawing = true;
                return Err(RenderError::DataTextureOverflow { required, capacity });
            }
        };
        self.skip_drawing = false;

        let recreate = match (&self.layout, self.texture) {
            (Some(old), Some(_)) => old.requires_recreate(&layout),
            _ => true,
        };
        if recreate {
            self.release_texture(ctx.cg);
            self.texture = Some(ctx.cg.create_float_texture(layout.width(), layout.height())?);
            log::debug!(
                "Data texture {}x{} created (instance {} + pad {} + vertex {} bytes)",
                layout.width(),
                layout.height(),
                layout.instance_bytes(),
                layout.padding(),
                layout.vertex_bytes()
            );
        }
        let texture = self
            .texture
            .ok_or_else(|| RenderError::ResourceCreationFailed("data texture".to_string()))?;

        let instance_dirty = self.uploaded_instance_version != Some(instance.version());
        let vertex_dirty =
            layout.vertex_bytes() > 0 && self.uploaded_vertex_version != Some(vertex.version());
        if instance_dirty || vertex_dirty {
            let vertex_words: &[f32] = if layout.vertex_bytes() > 0 {
                vertex.as_words()
            } else {
                &[]
            };
            let payload = layout.pack(instance.as_words(), vertex_words);
            let upload_len = if vertex_dirty {
                payload.len()
            } else {
                let row_floats = layout.width() * 4;
                let rows = layout
                    .total_size_except_vertex_data()
                    .div_ceil(layout.width() * TEXEL_BYTES);
                (rows * row_floats).min(payload.len())
            };
            ctx.cg.upload_texture(texture, 0, &payload[..upload_len])?;
            self.uploads += 1;
            self.uploaded_instance_version = Some(instance.version());
            if layout.vertex_bytes() > 0 {
                self.uploaded_vertex_version = Some(vertex.version());
            }
        }

        if layout.uniform_block_vec4s() > 0 && (instance_dirty || self.uniform_block.is_none()) {
            self.refresh_uniform_block(ctx.cg, &layout, instance.as_words())?;
        }

        self.layout = Some(layout);
        Ok(())
    }

    fn common_render(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        draws: &[DrawItem],
        pass: &RenderPass,
        tick_count: u64,
        _display_idx: u32,
    ) -> RenderResult<usize> {
        self.state.begin_pass(tick_count);
        if self.skip_drawing {
            log::debug!("Data texture overflowed; skipping {} draws", draws.len());
            return Ok(0);
        }
        let (Some(layout), Some(texture)) = (self.layout, self.texture) else {
            log::warn!("Data texture not prepared before rendering");
            return Ok(0);
        };
        let dialect = ShaderDialect::DataTextureGlsl {
            layout,
            is_webgl2: self.is_webgl2,
        };

        let mut issued = 0;
        for draw in draws {
            if draw.culled {
                continue;
            }
            let Some(material) = draw.material else {
                log::debug!("Primitive {:?} has no material; skipped", draw.primitive);
                continue;
            };
            let Some(program) =
                self.state
                    .ensure_program(ctx, StrategyKind::DataTexture, &dialect, material)?
            else {
                continue;
            };
            let Some(primitive) = ctx.meshes.primitive(draw.primitive) else {
                log::warn!("Primitive {:?} vanished before drawing", draw.primitive);
                continue;
            };
            let call = draw_call(primitive, 0);

            if self.state.bind_program(ctx.cg, program) {
                self.bind_resources(ctx, program, texture, &layout)?;
            }
            let material_changed = self.state.bind_material(material);
            if !self.state.bind_vertex_buffers(ctx.cg, draw.primitive) {
                continue;
            }
            set_draw_uniforms(ctx, program, draw, pass, material_changed);
            ctx.cg.draw(call);
            issued += 1;
        }
        Ok(issued)
    }

    fn destroy(&mut self, cg: &mut dyn CgApi) {
        self.state.release(cg);
        self.release_texture(cg);
        if let Some(buffer) = self.uniform_block.take() {
            cg.delete_buffer(buffer);
        }
        self.uniform_block_groups.clear();
        self.layout = None;
    }

    fn shader_property(
        &self,
        ctx: &StrategyContext<'_>,
        material_type_name: &str,
        info: &ShaderSemanticsInfo,
        is_global_data: bool,
        is_webgl2: bool,
    ) -> Option<String> {
        let dialect = self.dialect(is_webgl2)?;
        property_source(ctx, &dialect, material_type_name, info, is_global_data)
    }
}
