//! # Rendering strategies
//!
//! A strategy turns the shared instance memory into draw calls. The three
//! variants differ only in how per-instance data reaches the shader:
//!
//! - [`UniformStrategy`]: individual uniforms uploaded per draw
//! - [`DataTextureStrategy`]: the whole instance buffer packed into a float
//!   texture read by generated fetch functions
//! - [`WebGpuStrategy`]: the instance buffer mirrored into a storage buffer
//!
//! All three share [`StrategyState`]: the last bound program and material,
//! the per-pass tick cache, vertex buffers gated on the position accessor
//! version and programs cached on the layout versions they were generated
//! from.

mod data_texture;
mod uniform;
mod webgpu;

pub use data_texture::DataTextureStrategy;
pub use uniform::UniformStrategy;
pub use webgpu::WebGpuStrategy;

use std::collections::HashMap;

use crate::core::{EngineConfig, StrategyKind};
use crate::ecs::components::{CameraComponent, MeshComponent};
use crate::ecs::{Component, ComponentRepository, ComponentTid};
use crate::global_data::{GlobalDataRepository, ShaderSemantic, ShaderSemanticsInfo};
use crate::memory::{BufferUse, ComponentMemoryRegistry, MemoryManager, PropertyLocation};

use super::cg_api::{BufferHandle, BufferKind, CgApi, DrawCall, ProgramHandle, UniformValue};
use super::data_texture::DataTextureLayout;
use super::draw_list::DrawItem;
use super::material::{MaterialRepository, MaterialUid, ShaderSource};
use super::mesh::{MeshRepository, Primitive, PrimitiveUid};
use super::render_pass::RenderPass;
use super::shader_property::{
    glsl_data_texture_prelude, glsl_data_texture_property, glsl_uniform_property,
    wgsl_storage_prelude, wgsl_storage_property, wgsl_uniform_property,
};
use super::{RenderError, RenderResult};

/// Uniform holding the SIDs of the components being drawn, indexed by TID
pub const CURRENT_COMPONENT_SIDS_UNIFORM: &str = "u_currentComponentSIDs";
/// Uniform holding the SID of the bound material
pub const MATERIAL_SID_UNIFORM: &str = "u_materialSID";

/// Everything a strategy reads or drives during a stage
pub struct StrategyContext<'a> {
    /// Shared buffers
    pub memory: &'a MemoryManager,
    /// Component member layout
    pub registry: &'a ComponentMemoryRegistry,
    /// Global shader properties
    pub global: &'a GlobalDataRepository,
    /// Component stores
    pub components: &'a ComponentRepository,
    /// Meshes and primitives
    pub meshes: &'a MeshRepository,
    /// Materials (shader fallback mutates them)
    pub materials: &'a mut MaterialRepository,
    /// Device
    pub cg: &'a mut dyn CgApi,
}

/// Load / prerender / render contract of a rendering strategy
pub trait CgApiStrategy {
    /// Which strategy this is
    fn kind(&self) -> StrategyKind;

    /// Make sure the vertex buffers of a mesh exist and are current
    ///
    /// Returns `Ok(false)` (with a warning) when the component has no mesh
    /// yet; the caller retries next frame.
    fn load(&mut self, ctx: &mut StrategyContext<'_>, mesh: &MeshComponent) -> RenderResult<bool>;

    /// Refresh the per-frame GPU copy of the instance data, once per frame
    fn prerender(&mut self, ctx: &mut StrategyContext<'_>) -> RenderResult<()>;

    /// Draw a sorted list of primitives for one pass; returns the draws issued
    fn common_render(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        draws: &[DrawItem],
        pass: &RenderPass,
        tick_count: u64,
        display_idx: u32,
    ) -> RenderResult<usize>;

    /// Release every GPU resource
    fn destroy(&mut self, cg: &mut dyn CgApi);

    /// Shader text reading one property the way this strategy stores it
    ///
    /// `None` when the property cannot be located (unregistered semantic or
    /// no instance allocated yet).
    fn shader_property(
        &self,
        ctx: &StrategyContext<'_>,
        material_type_name: &str,
        info: &ShaderSemanticsInfo,
        is_global_data: bool,
        is_webgl2: bool,
    ) -> Option<String>;
}

/// The strategy selected at engine construction
#[derive(Debug)]
pub enum RenderingStrategy {
    /// Per-draw uniforms
    Uniform(UniformStrategy),
    /// Float data texture
    DataTexture(DataTextureStrategy),
    /// Storage buffer and bind groups
    WebGpu(WebGpuStrategy),
}

impl RenderingStrategy {
    /// Strategy named by the configuration
    pub fn new(config: &EngineConfig) -> Self {
        match config.strategy {
            StrategyKind::Uniform => Self::Uniform(UniformStrategy::new()),
            StrategyKind::DataTexture => {
                Self::DataTexture(DataTextureStrategy::new(config.data_texture))
            }
            StrategyKind::WebGpu => Self::WebGpu(WebGpuStrategy::new()),
        }
    }

    fn inner(&self) -> &dyn CgApiStrategy {
        match self {
            Self::Uniform(strategy) => strategy,
            Self::DataTexture(strategy) => strategy,
            Self::WebGpu(strategy) => strategy,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn CgApiStrategy {
        match self {
            Self::Uniform(strategy) => strategy,
            Self::DataTexture(strategy) => strategy,
            Self::WebGpu(strategy) => strategy,
        }
    }

    /// Shared state of the active strategy
    pub fn state(&self) -> &StrategyState {
        match self {
            Self::Uniform(strategy) => &strategy.state,
            Self::DataTexture(strategy) => &strategy.state,
            Self::WebGpu(strategy) => &strategy.state,
        }
    }

    /// Data texture strategy, if active
    pub fn as_data_texture(&self) -> Option<&DataTextureStrategy> {
        match self {
            Self::DataTexture(strategy) => Some(strategy),
            _ => None,
        }
    }
}

impl CgApiStrategy for RenderingStrategy {
    fn kind(&self) -> StrategyKind {
        self.inner().kind()
    }

    fn load(&mut self, ctx: &mut StrategyContext<'_>, mesh: &MeshComponent) -> RenderResult<bool> {
        self.inner_mut().load(ctx, mesh)
    }

    fn prerender(&mut self, ctx: &mut StrategyContext<'_>) -> RenderResult<()> {
        self.inner_mut().prerender(ctx)
    }

    fn common_render(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        draws: &[DrawItem],
        pass: &RenderPass,
        tick_count: u64,
        display_idx: u32,
    ) -> RenderResult<usize> {
        self.inner_mut()
            .common_render(ctx, draws, pass, tick_count, display_idx)
    }

    fn destroy(&mut self, cg: &mut dyn CgApi) {
        self.inner_mut().destroy(cg);
    }

    fn shader_property(
        &self,
        ctx: &StrategyContext<'_>,
        material_type_name: &str,
        info: &ShaderSemanticsInfo,
        is_global_data: bool,
        is_webgl2: bool,
    ) -> Option<String> {
        self.inner()
            .shader_property(ctx, material_type_name, info, is_global_data, is_webgl2)
    }
}

/// How generated getters read instance memory
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ShaderDialect {
    /// One `uniform` per property
    UniformGlsl,
    /// Fetches from the data texture
    DataTextureGlsl {
        /// Texture layout baked into the prelude
        layout: DataTextureLayout,
        /// `texelFetch` instead of `texture2D`
        is_webgl2: bool,
    },
    /// Reads from the storage buffer
    StorageWgsl,
}

/// Locate a property: global data, then the material type, then the
/// component member named like the semantic
pub(crate) fn locate_property(
    ctx: &StrategyContext<'_>,
    material_type_name: &str,
    info: &ShaderSemanticsInfo,
    is_global_data: bool,
) -> Option<PropertyLocation> {
    if is_global_data {
        return ctx.global.location_of_property(ctx.memory, &info.semantic);
    }
    if let Some(location) =
        ctx.materials
            .location_of_member_of_material(ctx.memory, material_type_name, &info.semantic)
    {
        return Some(location);
    }
    let tid = info.indexed_by?;
    ctx.registry.location_of_member(tid, info.semantic.as_str())
}

/// Getter text for one property in a dialect
pub(crate) fn property_source(
    ctx: &StrategyContext<'_>,
    dialect: &ShaderDialect,
    material_type_name: &str,
    info: &ShaderSemanticsInfo,
    is_global_data: bool,
) -> Option<String> {
    let array_length = info.resolved_array_length(ctx.global.default_array_length());
    if info.per_draw {
        return Some(match dialect {
            ShaderDialect::StorageWgsl => wgsl_uniform_property(info, array_length),
            _ => glsl_uniform_property(info, array_length),
        });
    }
    if matches!(dialect, ShaderDialect::UniformGlsl) {
        return Some(glsl_uniform_property(info, array_length));
    }
    let location = locate_property(ctx, material_type_name, info, is_global_data)?;
    match dialect {
        ShaderDialect::DataTextureGlsl { is_webgl2, .. } => {
            Some(glsl_data_texture_property(info, &location, *is_webgl2))
        }
        _ => Some(wgsl_storage_property(info, &location)),
    }
}

/// Full program source of a material type: prelude, getters, body
pub(crate) fn program_source(
    ctx: &StrategyContext<'_>,
    dialect: &ShaderDialect,
    material_type_name: &str,
) -> RenderResult<ShaderSource> {
    let material_type = ctx
        .materials
        .material_type(material_type_name)
        .ok_or_else(|| RenderError::MissingMaterial(material_type_name.to_string()))?;

    let mut getters = match dialect {
        ShaderDialect::UniformGlsl => String::new(),
        ShaderDialect::DataTextureGlsl { layout, is_webgl2 } => {
            glsl_data_texture_prelude(layout, *is_webgl2)
        }
        ShaderDialect::StorageWgsl => wgsl_storage_prelude().to_string(),
    };

    for (tid, member) in ctx.registry.members_in(BufferUse::GpuInstanceData) {
        let semantic = ShaderSemantic::from_static(member.name);
        let info = ShaderSemanticsInfo::new(semantic, member.composition_type)
            .with_component_type(member.component_type)
            .indexed_by(tid);
        if let Some(code) = property_source(ctx, dialect, material_type_name, &info, false) {
            getters.push_str(&code);
        }
    }
    for property in ctx.global.properties() {
        let info = &property.info;
        if let Some(code) = property_source(ctx, dialect, material_type_name, info, true) {
            getters.push_str(&code);
        }
    }
    for block in material_type.blocks() {
        if let Some(code) = property_source(ctx, dialect, material_type_name, &block.info, false) {
            getters.push_str(&code);
        }
    }

    let shader = material_type.shader();
    Ok(ShaderSource::new(
        format!("{getters}\n{}", shader.vertex),
        format!("{getters}\n{}", shader.fragment),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceVersions {
    registry: u64,
    global: u64,
    materials: u64,
}

impl SourceVersions {
    fn current(ctx: &StrategyContext<'_>) -> Self {
        Self {
            registry: ctx.registry.state_version(),
            global: ctx.global.version(),
            materials: ctx.materials.version(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ProgramEntry {
    program: Option<ProgramHandle>,
    versions: SourceVersions,
    prelude_key: Option<(usize, usize, usize)>,
}

/// GPU copies of one primitive's vertex data
#[derive(Debug, Clone, Copy)]
pub struct VertexBuffers {
    /// Positions
    pub position: BufferHandle,
    /// Normals
    pub normal: Option<BufferHandle>,
    /// Indices
    pub index: Option<BufferHandle>,
    /// Position accessor version the buffers were built from
    pub position_version: u64,
}

impl VertexBuffers {
    fn release(&self, cg: &mut dyn CgApi) {
        cg.delete_buffer(self.position);
        if let Some(normal) = self.normal {
            cg.delete_buffer(normal);
        }
        if let Some(index) = self.index {
            cg.delete_buffer(index);
        }
    }
}

/// Bookkeeping shared by every strategy
#[derive(Debug, Default)]
pub struct StrategyState {
    last_program: Option<ProgramHandle>,
    last_material: Option<MaterialUid>,
    last_tick: Option<u64>,
    vertex_buffers: HashMap<PrimitiveUid, VertexBuffers>,
    programs: HashMap<String, ProgramEntry>,
    program_builds: u64,
}

impl StrategyState {
    /// Program bound by the last draw
    pub const fn last_program(&self) -> Option<ProgramHandle> {
        self.last_program
    }

    /// Material bound by the last draw
    pub const fn last_material(&self) -> Option<MaterialUid> {
        self.last_material
    }

    /// Vertex buffers of a loaded primitive
    pub fn vertex_buffers(&self, primitive: PrimitiveUid) -> Option<&VertexBuffers> {
        self.vertex_buffers.get(&primitive)
    }

    /// Programs (re)generated so far
    pub const fn program_builds(&self) -> u64 {
        self.program_builds
    }

    /// Start of a pass: a new tick forgets what is bound
    pub(crate) fn begin_pass(&mut self, tick_count: u64) {
        if self.last_tick != Some(tick_count) {
            self.last_tick = Some(tick_count);
            self.last_program = None;
            self.last_material = None;
        }
    }

    /// Upload (or refresh) the vertex buffers of every primitive of a mesh
    pub(crate) fn load_mesh(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        mesh_component: &MeshComponent,
    ) -> RenderResult<bool> {
        let Some(mesh_uid) = mesh_component.mesh() else {
            log::warn!("No mesh set on {}", mesh_component.base().entity_uid);
            return Ok(false);
        };
        let Some(mesh) = ctx.meshes.mesh(mesh_uid) else {
            log::warn!("Mesh {:?} not found; retrying next frame", mesh_uid);
            return Ok(false);
        };

        for &primitive_uid in mesh.primitives() {
            let primitive = ctx
                .meshes
                .primitive(primitive_uid)
                .ok_or(RenderError::MissingPrimitive(primitive_uid))?;
            let version = primitive.position_accessor_version(ctx.memory)?;
            if self
                .vertex_buffers
                .get(&primitive_uid)
                .is_some_and(|buffers| buffers.position_version == version)
            {
                continue;
            }
            if let Some(old) = self.vertex_buffers.remove(&primitive_uid) {
                old.release(ctx.cg);
            }
            let buffers = upload_primitive(ctx, primitive, version)?;
            log::debug!(
                "Uploaded primitive {:?} ({} vertices, version {})",
                primitive_uid,
                primitive.vertex_count(),
                version
            );
            self.vertex_buffers.insert(primitive_uid, buffers);
        }
        Ok(true)
    }

    /// Program of a material, generating and linking it when its sources
    /// are stale
    ///
    /// A failed link rolls the material type back to its last working
    /// shader and tries once more. `None` means the primitive is skipped this
    /// frame (textures still loading or no working program).
    pub(crate) fn ensure_program(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        kind: StrategyKind,
        dialect: &ShaderDialect,
        material_uid: MaterialUid,
    ) -> RenderResult<Option<ProgramHandle>> {
        let material = ctx
            .materials
            .material(material_uid)
            .ok_or_else(|| RenderError::MissingMaterial(format!("{material_uid:?}")))?;
        if !material.is_texture_ready() {
            return Ok(None);
        }
        let type_name = material.type_name().to_string();
        let prelude_key = match dialect {
            ShaderDialect::DataTextureGlsl { layout, .. } => {
                Some((layout.width(), layout.height(), layout.uniform_block_vec4s()))
            }
            _ => None,
        };

        if let Some(entry) = self.programs.get(&type_name) {
            if entry.versions == SourceVersions::current(ctx) && entry.prelude_key == prelude_key {
                return Ok(entry.program);
            }
        }

        let program = build_program(ctx, dialect, &type_name)?;
        self.program_builds += 1;
        let entry = ProgramEntry {
            program,
            versions: SourceVersions::current(ctx),
            prelude_key,
        };
        if let Some(old) = self.programs.insert(type_name.clone(), entry).and_then(|e| e.program) {
            ctx.cg.delete_program(old);
        }

        let uids: Vec<MaterialUid> = ctx
            .materials
            .materials()
            .iter()
            .filter(|m| m.type_name() == type_name)
            .map(|m| m.uid())
            .collect();
        for uid in uids {
            if let Some(material) = ctx.materials.material_mut(uid) {
                material.set_program(kind, program);
            }
        }
        self.last_program = None;
        Ok(program)
    }

    /// Make `program` current; true when it was not already
    pub(crate) fn bind_program(&mut self, cg: &mut dyn CgApi, program: ProgramHandle) -> bool {
        if self.last_program == Some(program) {
            return false;
        }
        cg.use_program(program);
        self.last_program = Some(program);
        self.last_material = None;
        true
    }

    /// Record `material` as bound; true when it was not already
    pub(crate) fn bind_material(&mut self, material: MaterialUid) -> bool {
        if self.last_material == Some(material) {
            return false;
        }
        self.last_material = Some(material);
        true
    }

    /// Bind the vertex buffers of a primitive; false when it is not loaded
    pub(crate) fn bind_vertex_buffers(&self, cg: &mut dyn CgApi, primitive: PrimitiveUid) -> bool {
        let Some(buffers) = self.vertex_buffers.get(&primitive) else {
            return false;
        };
        let mut vertex = vec![buffers.position];
        vertex.extend(buffers.normal);
        cg.bind_vertex_buffers(&vertex, buffers.index);
        true
    }

    /// Delete every program and vertex buffer
    pub(crate) fn release(&mut self, cg: &mut dyn CgApi) {
        for (_, buffers) in self.vertex_buffers.drain() {
            buffers.release(cg);
        }
        for (_, entry) in self.programs.drain() {
            if let Some(program) = entry.program {
                cg.delete_program(program);
            }
        }
        self.last_program = None;
        self.last_material = None;
        self.last_tick = None;
    }
}

fn upload_primitive(
    ctx: &mut StrategyContext<'_>,
    primitive: &Primitive,
    position_version: u64,
) -> RenderResult<VertexBuffers> {
    let positions = primitive.positions(ctx.memory)?;
    let position = ctx
        .cg
        .create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&positions))?;
    let normal = match primitive.normals(ctx.memory)? {
        Some(normals) => {
            Some(ctx.cg.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&normals))?)
        }
        None => None,
    };
    let index = match primitive.indices() {
        Some(indices) => {
            Some(ctx.cg.create_buffer(BufferKind::Index, bytemuck::cast_slice(indices))?)
        }
        None => None,
    };
    Ok(VertexBuffers {
        position,
        normal,
        index,
        position_version,
    })
}

fn build_program(
    ctx: &mut StrategyContext<'_>,
    dialect: &ShaderDialect,
    type_name: &str,
) -> RenderResult<Option<ProgramHandle>> {
    let source = program_source(ctx, dialect, type_name)?;
    match ctx.cg.create_program(type_name, &source.vertex, &source.fragment) {
        Ok(program) => {
            ctx.materials.mark_shader_working(type_name);
            return Ok(Some(program));
        }
        Err(err) => log::warn!("{err}"),
    }

    if !ctx.materials.restore_backup(type_name) {
        log::error!("No working shader to fall back to for material type {type_name}");
        return Ok(None);
    }
    let source = program_source(ctx, dialect, type_name)?;
    match ctx.cg.create_program(type_name, &source.vertex, &source.fragment) {
        Ok(program) => Ok(Some(program)),
        Err(err) => {
            log::error!("Fallback shader of material type {type_name} failed too: {err}");
            Ok(None)
        }
    }
}

/// Per-draw component SIDs, indexed by component TID; -1 where absent
pub(crate) fn current_component_sids(
    ctx: &StrategyContext<'_>,
    draw: &DrawItem,
    pass: &RenderPass,
) -> Vec<i32> {
    let mut sids = vec![-1; ComponentTid::COUNT];
    let mut set = |tid: ComponentTid, value: usize| {
        if let Some(slot) = sids.get_mut(tid.index()) {
            *slot = value as i32;
        }
    };
    set(ComponentTid::SCENE_GRAPH, draw.scene_graph_sid.index());
    set(ComponentTid::MESH_RENDERER, draw.mesh_renderer_sid.index());
    if let Some(index) = camera_global_index(ctx, pass) {
        set(ComponentTid::CAMERA, index);
    }
    sids
}

/// Global count index of the pass camera's matrices
pub(crate) fn camera_global_index(ctx: &StrategyContext<'_>, pass: &RenderPass) -> Option<usize> {
    let sid = pass.camera_sid()?;
    ctx.components.get::<CameraComponent>(sid)?.global_index()
}

/// Draw call for one primitive
pub(crate) fn draw_call(primitive: &Primitive, first_instance: u32) -> DrawCall {
    DrawCall {
        element_count: primitive.element_count() as u32,
        indexed: primitive.indices().is_some(),
        instance_count: 1,
        first_instance,
    }
}

/// Upload the material SID and the per-draw component SIDs
pub(crate) fn set_draw_uniforms(
    ctx: &mut StrategyContext<'_>,
    program: ProgramHandle,
    draw: &DrawItem,
    pass: &RenderPass,
    material_changed: bool,
) {
    if material_changed {
        if let Some(sid) = draw
            .material
            .and_then(|uid| ctx.materials.material(uid))
            .map(|m| m.material_sid())
        {
            ctx.cg
                .set_uniform(program, MATERIAL_SID_UNIFORM, &UniformValue::Int(sid as i32));
        }
    }
    let sids = current_component_sids(ctx, draw, pass);
    ctx.cg.set_uniform(
        program,
        CURRENT_COMPONENT_SIDS_UNIFORM,
        &UniformValue::IntArray(sids),
    );
}
