//! Storage buffer strategy
//!
//! The taken part of the instance data buffer is mirrored into one read-only
//! storage buffer bound at group 0. Each draw passes the scene graph SID as
//! its first instance, which the WGSL getters use as `instanceId`.

use std::collections::HashMap;

use crate::core::StrategyKind;
use crate::ecs::components::MeshComponent;
use crate::foundation::math::utils::align_up;
use crate::global_data::ShaderSemanticsInfo;
use crate::memory::BufferUse;
use crate::render::cg_api::{
    BindGroupHandle, BindingResource, BufferHandle, BufferKind, CgApi, ProgramHandle,
};
use crate::render::draw_list::DrawItem;
use crate::render::render_pass::RenderPass;
use crate::render::RenderResult;

use super::{
    draw_call, property_source, set_draw_uniforms, CgApiStrategy, ShaderDialect, StrategyContext,
    StrategyState,
};

/// Smallest storage buffer created, one vec4
const MIN_STORAGE_BYTES: usize = 16;

/// Storage buffer strategy
#[derive(Debug, Default)]
pub struct WebGpuStrategy {
    pub(super) state: StrategyState,
    storage: Option<BufferHandle>,
    storage_len: usize,
    uploaded_version: Option<u64>,
    bind_groups: HashMap<ProgramHandle, BindGroupHandle>,
}

impl WebGpuStrategy {
    /// Create the strategy
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage buffer mirroring the instance data
    pub const fn storage_buffer(&self) -> Option<BufferHandle> {
        self.storage
    }

    fn bind_group(
        &mut self,
        cg: &mut dyn CgApi,
        program: ProgramHandle,
    ) -> RenderResult<Option<BindGroupHandle>> {
        let Some(buffer) = self.storage else {
            return Ok(None);
        };
        if let Some(group) = self.bind_groups.get(&program) {
            return Ok(Some(*group));
        }
        let group =
            cg.create_bind_group(program, &[BindingResource::Buffer { binding: 0, buffer }])?;
        self.bind_groups.insert(program, group);
        Ok(Some(group))
    }
}

impl CgApiStrategy for WebGpuStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::WebGpu
    }

    fn load(&mut self, ctx: &mut StrategyContext<'_>, mesh: &MeshComponent) -> RenderResult<bool> {
        self.state.load_mesh(ctx, mesh)
    }

    /// Mirror the instance data; the buffer is recreated when its length
    /// changes and rewritten when the data version changes
    fn prerender(&mut self, ctx: &mut StrategyContext<'_>) -> RenderResult<()> {
        let instance = ctx.memory.buffer(BufferUse::GpuInstanceData);
        let len = align_up(instance.taken_byte_index(), 16).max(MIN_STORAGE_BYTES);
        let bytes = instance.as_bytes();
        let mut payload = vec![0u8; len];
        let copy = len.min(bytes.len());
        payload[..copy].copy_from_slice(&bytes[..copy]);

        if self.storage.is_none() || self.storage_len != len {
            if let Some(old) = self.storage.take() {
                ctx.cg.delete_buffer(old);
            }
            self.storage = Some(ctx.cg.create_buffer(BufferKind::Storage, &payload)?);
            self.storage_len = len;
            self.bind_groups.clear();
            log::debug!("Storage buffer created ({} bytes)", len);
        } else if self.uploaded_version != Some(instance.version()) {
            if let Some(buffer) = self.storage {
                ctx.cg.write_buffer(buffer, 0, &payload)?;
            }
        }
        self.uploaded_version = Some(instance.version());
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
        let mut issued = 0;
        for draw in draws {
            if draw.culled {
                continue;
            }
            let Some(material) = draw.material else {
                continue;
            };
            let Some(program) = self.state.ensure_program(
                ctx,
                StrategyKind::WebGpu,
                &ShaderDialect::StorageWgsl,
                material,
            )?
            else {
                continue;
            };
            let Some(primitive) = ctx.meshes.primitive(draw.primitive) else {
                log::warn!("Primitive {:?} vanished before drawing", draw.primitive);
                continue;
            };
            let call = draw_call(primitive, draw.scene_graph_sid.0);

            if self.state.bind_program(ctx.cg, program) {
                match self.bind_group(ctx.cg, program)? {
                    Some(group) => ctx.cg.set_bind_group(0, group),
                    None => log::warn!("Storage buffer missing; prerender was not run"),
                }
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
        if let Some(buffer) = self.storage.take() {
            cg.delete_buffer(buffer);
        }
        self.storage_len = 0;
        self.uploaded_version = None;
        self.bind_groups.clear();
    }

    fn shader_property(
        &self,
        ctx: &StrategyContext<'_>,
        material_type_name: &str,
        info: &ShaderSemanticsInfo,
        is_global_data: bool,
        _is_webgl2: bool,
    ) -> Option<String> {
        property_source(ctx, &ShaderDialect::StorageWgsl, material_type_name, info, is_global_data)
    }
}
