//! Per-draw uniform upload
//!
//! Every property is its own `uniform`. Globals are re-uploaded whenever the
//! program changes, material parameters whenever the material changes, and
//! the scene graph members of the drawn entity on every draw. Culled
//! entities are never submitted.

use crate::core::StrategyKind;
use crate::ecs::components::{MeshComponent, SceneGraphComponent};
use crate::ecs::ComponentTid;
use crate::foundation::math::{Mat3, Mat4};
use crate::global_data::ShaderSemanticsInfo;
use crate::memory::{
    AccessorHandle, ComponentType, CompositionType, ElementSlot, MemoryManager, PropertyLayout,
};
use crate::render::cg_api::{CgApi, ProgramHandle, UniformValue};
use crate::render::draw_list::DrawItem;
use crate::render::material::MaterialUid;
use crate::render::render_pass::RenderPass;
use crate::render::shader_property::uniform_name;
use crate::render::RenderResult;

use super::{
    camera_global_index, draw_call, property_source, set_draw_uniforms, CgApiStrategy,
    ShaderDialect, StrategyContext, StrategyState,
};

/// Uniform strategy
#[derive(Debug, Default)]
pub struct UniformStrategy {
    pub(super) state: StrategyState,
}

impl UniformStrategy {
    /// Create the strategy
    pub fn new() -> Self {
        Self::default()
    }

    fn upload_globals(
        &self,
        ctx: &mut StrategyContext<'_>,
        program: ProgramHandle,
        pass: &RenderPass,
    ) -> RenderResult<()> {
        let camera_index = camera_global_index(ctx, pass).unwrap_or(0);
        // per-draw properties are set by `set_draw_uniforms`
        for property in ctx.global.properties().iter().filter(|p| !p.info.per_draw) {
            let count = if property.info.indexed_by == Some(ComponentTid::CAMERA) {
                camera_index.min(property.max_count.saturating_sub(1))
            } else {
                0
            };
            let value = read_uniform(
                ctx.memory,
                property.accessor,
                count,
                &property.layout,
                &property.info,
            )?;
            ctx.cg
                .set_uniform(program, &uniform_name(&property.info), &value);
        }
        Ok(())
    }

    fn upload_material(
        &self,
        ctx: &mut StrategyContext<'_>,
        program: ProgramHandle,
        material: MaterialUid,
    ) -> RenderResult<()> {
        let Some(material) = ctx.materials.material(material) else {
            return Ok(());
        };
        let Some(material_type) = ctx.materials.material_type(material.type_name()) else {
            return Ok(());
        };
        let sid = material.material_sid();
        for block in material_type.blocks() {
            let value = read_uniform(ctx.memory, block.accessor, sid, &block.layout, &block.info)?;
            ctx.cg
                .set_uniform(program, &uniform_name(&block.info), &value);
        }
        Ok(())
    }

    fn upload_instance(
        &self,
        ctx: &mut StrategyContext<'_>,
        program: ProgramHandle,
        draw: &DrawItem,
    ) -> RenderResult<()> {
        let Some(node) = ctx.components.get::<SceneGraphComponent>(draw.scene_graph_sid) else {
            return Ok(());
        };
        let world = node.world_matrix(ctx.memory)?;
        let normal = node.normal_matrix(ctx.memory)?;
        let visible = node.is_visible(ctx.memory)?;
        let billboard = node.is_billboard(ctx.memory)?;
        ctx.cg
            .set_uniform(program, "u_worldMatrix", &UniformValue::Mat4(world));
        ctx.cg
            .set_uniform(program, "u_normalMatrix", &UniformValue::Mat3(normal));
        ctx.cg.set_uniform(
            program,
            "u_isVisible",
            &UniformValue::Float(if visible { 1.0 } else { 0.0 }),
        );
        ctx.cg.set_uniform(
            program,
            "u_isBillboard",
            &UniformValue::Float(if billboard { 1.0 } else { 0.0 }),
        );
        Ok(())
    }
}

/// Read one instance of a property as a uniform payload
///
/// Arrays are uploaded whole, as their raw floats.
fn read_uniform(
    memory: &MemoryManager,
    accessor: AccessorHandle,
    index: usize,
    layout: &PropertyLayout,
    info: &ShaderSemanticsInfo,
) -> RenderResult<UniformValue> {
    let slot = ElementSlot {
        accessor,
        index: index as u32,
    };
    let offset = memory.slot_byte_offset(slot)?;
    let words = memory
        .buffer(accessor.usage)
        .read_words(offset, layout.aligned_byte_length() / 4)?;
    Ok(uniform_from_words(layout, info, words))
}

fn uniform_from_words(
    layout: &PropertyLayout,
    info: &ShaderSemanticsInfo,
    words: &[f32],
) -> UniformValue {
    if layout.composition_type.is_array() {
        return UniformValue::FloatArray(words.to_vec());
    }
    let mut padded = [0.0f32; 16];
    let len = words.len().min(16);
    padded[..len].copy_from_slice(&words[..len]);
    match layout.composition_type {
        CompositionType::Scalar => match info.component_type {
            ComponentType::Int | ComponentType::UnsignedInt => UniformValue::Int(padded[0] as i32),
            _ => UniformValue::Float(padded[0]),
        },
        CompositionType::Mat3 => UniformValue::Mat3(Mat3::from_column_slice(&padded[..9])),
        CompositionType::Mat4 => UniformValue::Mat4(Mat4::from_column_slice(&padded)),
        _ => UniformValue::Vec4([padded[0], padded[1], padded[2], padded[3]]),
    }
}

impl CgApiStrategy for UniformStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Uniform
    }

    fn load(&mut self, ctx: &mut StrategyContext<'_>, mesh: &MeshComponent) -> RenderResult<bool> {
        self.state.load_mesh(ctx, mesh)
    }

    fn prerender(&mut self, _ctx: &mut StrategyContext<'_>) -> RenderResult<()> {
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
                log::debug!("Primitive {:?} has no material; skipped", draw.primitive);
                continue;
            };
            let Some(program) = self.state.ensure_program(
                ctx,
                StrategyKind::Uniform,
                &ShaderDialect::UniformGlsl,
                material,
            )?
            else {
                continue;
            };
            let Some(primitive) = ctx.meshes.primitive(draw.primitive) else {
                log::warn!("Primitive {:?} vanished before drawing", draw.primitive);
                continue;
            };
            let call = draw_call(primitive, 0);

            if self.state.bind_program(ctx.cg, program) {
                self.upload_globals(ctx, program, pass)?;
            }
            let material_changed = self.state.bind_material(material);
            if material_changed {
                self.upload_material(ctx, program, material)?;
            }
            if !self.state.bind_vertex_buffers(ctx.cg, draw.primitive) {
                continue;
            }
            self.upload_instance(ctx, program, draw)?;
            set_draw_uniforms(ctx, program, draw, pass, material_changed);
            ctx.cg.draw(call);
            issued += 1;
        }
        Ok(issued)
    }

    fn destroy(&mut self, cg: &mut dyn CgApi) {
        self.state.release(cg);
    }

    fn shader_property(
        &self,
        ctx: &StrategyContext<'_>,
        material_type_name: &str,
        info: &ShaderSemanticsInfo,
        is_global_data: bool,
        _is_webgl2: bool,
    ) -> Option<String> {
        property_source(ctx, &ShaderDialect::UniformGlsl, material_type_name, info, is_global_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_from_words_shapes() {
        let info = ShaderSemanticsInfo::new(
            crate::global_data::ShaderSemantic::VIEW_POSITION,
            CompositionType::Vec3,
        );
        let layout = PropertyLayout::new(CompositionType::Vec3, 1);
        assert_eq!(
            uniform_from_words(&layout, &info, &[1.0, 2.0, 3.0, 0.0]),
            UniformValue::Vec4([1.0, 2.0, 3.0, 0.0])
        );

        let array = PropertyLayout::new(CompositionType::Vec3Array, 2);
        assert_eq!(
            uniform_from_words(&array, &info, &[1.0; 8]),
            UniformValue::FloatArray(vec![1.0; 8])
        );
    }
}
