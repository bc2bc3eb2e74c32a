//! Engine: owns every repository and drives the per-frame stages
//!
//! One [`Engine`] value holds the shared memory, the component and entity
//! repositories, global data, materials, meshes, the rendering strategy and
//! the device. Nothing is reachable through globals; independent engines can
//! coexist in one process.
//!
//! A frame runs `Create → Load → Logic → PreRender → Render`:
//!
//! ```text
//! Create     wire new components to siblings and global data
//! Load       let the strategy upload meshes of new or changed renderers
//! Logic      transforms, scene graph (parents first), cameras, lights, time
//! PreRender  strategy refreshes its GPU copy of instance memory, once
//! Render     per pass: resolve camera, cull, sort, draw
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::EngineConfig;
use crate::ecs::components::{
    CameraComponent, LightComponent, LightType, MeshComponent, MeshRendererComponent,
    SceneGraphComponent, TransformComponent,
};
use crate::ecs::systems::{run_create, run_logic};
use crate::ecs::{
    Component, ComponentRepository, ComponentSid, EcsError, EntityRepository, EntityUid,
    LogicReport, ProcessStage,
};
use crate::foundation::math::{view_depth, Mat4};
use crate::foundation::time::FrameClock;
use crate::global_data::{
    GlobalDataError, GlobalDataRepository, ShaderSemantic, ShaderSemanticsInfo,
};
use crate::memory::{ComponentMemoryRegistry, MemoryError, MemoryManager, PropertyValue};
use crate::render::{
    sort_draw_items, CgApi, CgApiStrategy, DrawItem, MaterialRepository, MaterialUid,
    MeshRepository, MeshUid, PrimitiveDesc, PrimitiveUid, RenderError, RenderPass,
    RenderingStrategy, ShaderSource, StrategyContext,
};

/// Errors surfaced by [`Engine`]
#[derive(Error, Debug)]
pub enum EngineError {
    /// Shared memory failure
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Component or entity failure
    #[error("ECS error: {0}")]
    Ecs(#[from] EcsError),

    /// Global data failure
    #[error("Global data error: {0}")]
    GlobalData(#[from] GlobalDataError),

    /// Rendering failure
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The engine was shut down
    #[error("Engine has been shut down")]
    ShutDown,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// What one frame did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Frame number, starting at 1
    pub frame: u64,
    /// Components that ran their Create hook
    pub created: usize,
    /// Components entering each stage this frame
    pub stage_entries: BTreeMap<ProcessStage, usize>,
    /// Mesh renderers whose meshes were (re)loaded
    pub loaded: usize,
    /// Mesh renderers whose load must be retried
    pub load_pending: usize,
    /// What Logic recomputed
    pub logic: LogicReport,
    /// Data texture overflow reported by PreRender, if any
    pub overflow: Option<RenderError>,
    /// Render passes processed
    pub passes: usize,
    /// Mesh renderers culled, summed over passes
    pub culled: usize,
    /// Draw calls issued, summed over passes
    pub draws: usize,
}

/// Retained-mode scene engine over a device `G`
pub struct Engine<G: CgApi> {
    config: EngineConfig,
    memory: MemoryManager,
    registry: ComponentMemoryRegistry,
    global: GlobalDataRepository,
    components: ComponentRepository,
    entities: EntityRepository,
    materials: MaterialRepository,
    meshes: MeshRepository,
    strategy: RenderingStrategy,
    cg: G,
    clock: FrameClock,
    frame: u64,
    render_tick: u64,
    is_shut_down: bool,
}

/// Borrow the engine's fields as a strategy context
macro_rules! strategy_context {
    ($engine:expr) => {
        StrategyContext {
            memory: &$engine.memory,
            registry: &$engine.registry,
            global: &$engine.global,
            components: &$engine.components,
            meshes: &$engine.meshes,
            materials: &mut $engine.materials,
            cg: &mut $engine.cg,
        }
    };
}

impl<G: CgApi> Engine<G> {
    /// Create an engine driving `cg` with the strategy named in `config`
    pub fn new(config: EngineConfig, cg: G) -> EngineResult<Self> {
        config.validate()?;
        log::info!("Initializing engine with the {} strategy", config.strategy);

        let limits = config.limits;
        let mut memory = MemoryManager::new(&config.buffers);
        let mut global = GlobalDataRepository::new(limits.default_array_length);
        global.register_default_properties(&mut memory, &limits)?;

        // single-instance properties are leased up front so systems can write them
        let singletons: Vec<ShaderSemantic> = global
            .properties()
            .iter()
            .filter(|p| p.max_count == 1)
            .map(|p| p.info.semantic.clone())
            .collect();
        for semantic in &singletons {
            global.try_take_one(&mut memory, semantic, 0)?;
        }

        let strategy = RenderingStrategy::new(&config);
        Ok(Self {
            memory,
            registry: ComponentMemoryRegistry::new(),
            global,
            components: ComponentRepository::new(limits.max_components_per_view),
            entities: EntityRepository::new(),
            materials: MaterialRepository::new(limits.default_array_length),
            meshes: MeshRepository::new(),
            strategy,
            cg,
            clock: FrameClock::new(),
            frame: 0,
            render_tick: 0,
            is_shut_down: false,
            config,
        })
    }

    /// Configuration the engine was built with
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared memory
    pub const fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Component member layout
    pub const fn registry(&self) -> &ComponentMemoryRegistry {
        &self.registry
    }

    /// Global shader properties
    pub const fn global(&self) -> &GlobalDataRepository {
        &self.global
    }

    /// Component stores
    pub const fn components(&self) -> &ComponentRepository {
        &self.components
    }

    /// Entities
    pub const fn entities(&self) -> &EntityRepository {
        &self.entities
    }

    /// Materials
    pub const fn materials(&self) -> &MaterialRepository {
        &self.materials
    }

    /// Materials, mutable
    pub fn materials_mut(&mut self) -> &mut MaterialRepository {
        &mut self.materials
    }

    /// Meshes and primitives
    pub const fn meshes(&self) -> &MeshRepository {
        &self.meshes
    }

    /// Meshes and primitives, mutable
    pub fn meshes_mut(&mut self) -> &mut MeshRepository {
        &mut self.meshes
    }

    /// Active rendering strategy
    pub const fn strategy(&self) -> &RenderingStrategy {
        &self.strategy
    }

    /// Device
    pub const fn cg(&self) -> &G {
        &self.cg
    }

    /// Device, mutable
    pub fn cg_mut(&mut self) -> &mut G {
        &mut self.cg
    }

    /// Frame clock feeding the `time` semantic
    pub const fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Frames processed so far
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Create an entity with no components
    pub fn create_entity(&mut self) -> EntityUid {
        self.entities.create_entity()
    }

    /// Allocate a component of type `C` and attach it to `uid`
    pub fn add_component<C: Component>(&mut self, uid: EntityUid) -> EngineResult<ComponentSid> {
        Ok(self.entities.add_component::<C>(
            uid,
            &mut self.components,
            &mut self.memory,
            &mut self.registry,
        )?)
    }

    /// Destroy an entity and every component attached to it
    pub fn destroy_entity(&mut self, uid: EntityUid) -> EngineResult<()> {
        self.entities
            .destroy_entity(uid, &mut self.components, &mut self.memory, &self.global)?;
        Ok(())
    }

    /// Component of type `C` attached to `uid`
    pub fn component<C: Component>(&self, uid: EntityUid) -> Option<&C> {
        let sid = self.entities.component_sid::<C>(uid)?;
        self.components.get::<C>(sid)
    }

    /// Run `f` on the component of type `C` attached to `uid`, with write
    /// access to shared memory
    pub fn update_component<C: Component, R>(
        &mut self,
        uid: EntityUid,
        f: impl FnOnce(&mut C, &mut MemoryManager) -> Result<R, EcsError>,
    ) -> EngineResult<R> {
        let sid = self.entities.require_component_sid::<C>(uid)?;
        let component = self
            .components
            .get_mut::<C>(sid)
            .ok_or(EcsError::MissingComponent {
                entity: uid,
                component: C::NAME,
            })?;
        Ok(f(component, &mut self.memory)?)
    }

    /// Entity with a transform, scene graph node, mesh and mesh renderer
    pub fn create_mesh_entity(&mut self, mesh: MeshUid) -> EngineResult<EntityUid> {
        if self.meshes.mesh(mesh).is_none() {
            return Err(RenderError::MissingMesh(mesh).into());
        }
        let uid = self.create_entity();
        self.add_component::<TransformComponent>(uid)?;
        self.add_component::<SceneGraphComponent>(uid)?;
        let mesh_sid = self.add_component::<MeshComponent>(uid)?;
        if let Some(component) = self.components.get_mut::<MeshComponent>(mesh_sid) {
            component.set_mesh(Some(mesh));
        }
        self.add_component::<MeshRendererComponent>(uid)?;
        Ok(uid)
    }

    /// Entity with a transform, scene graph node and perspective camera
    pub fn create_camera_entity(&mut self) -> EngineResult<EntityUid> {
        let uid = self.create_entity();
        self.add_component::<TransformComponent>(uid)?;
        self.add_component::<SceneGraphComponent>(uid)?;
        self.add_component::<CameraComponent>(uid)?;
        Ok(uid)
    }

    /// Entity with a transform, scene graph node and light
    pub fn create_light_entity(&mut self, light_type: LightType) -> EngineResult<EntityUid> {
        let uid = self.create_entity();
        self.add_component::<TransformComponent>(uid)?;
        self.add_component::<SceneGraphComponent>(uid)?;
        let sid = self.add_component::<LightComponent>(uid)?;
        if let Some(light) = self.components.get_mut::<LightComponent>(sid) {
            light.set_light_type(light_type);
        }
        Ok(uid)
    }

    /// Register a material type
    pub fn register_material_type(
        &mut self,
        name: &str,
        semantics: Vec<ShaderSemanticsInfo>,
        shader: ShaderSource,
    ) -> EngineResult<()> {
        let max_instances = self.config.limits.max_material_instances;
        self.materials
            .register_material_type(&mut self.memory, name, semantics, max_instances, shader)?;
        Ok(())
    }

    /// Create a material of a registered type
    pub fn create_material(&mut self, type_name: &str) -> EngineResult<MaterialUid> {
        Ok(self.materials.create_material(&mut self.memory, type_name)?)
    }

    /// Write a material parameter
    pub fn set_material_parameter(
        &mut self,
        material: MaterialUid,
        semantic: &ShaderSemantic,
        value: &PropertyValue,
    ) -> EngineResult<()> {
        self.materials
            .set_parameter(&mut self.memory, material, semantic, value)?;
        Ok(())
    }

    /// Upload a primitive into vertex memory
    pub fn create_primitive(&mut self, desc: PrimitiveDesc) -> EngineResult<PrimitiveUid> {
        Ok(self.meshes.create_primitive(&mut self.memory, desc)?)
    }

    /// Group primitives into a mesh
    pub fn create_mesh(&mut self, primitives: Vec<PrimitiveUid>) -> EngineResult<MeshUid> {
        Ok(self.meshes.create_mesh(primitives)?)
    }

    /// Replace a primitive's positions (bumps its vertex version)
    pub fn set_primitive_positions(
        &mut self,
        primitive: PrimitiveUid,
        positions: &[f32],
    ) -> EngineResult<()> {
        let primitive = self
            .meshes
            .primitive_mut(primitive)
            .ok_or(RenderError::MissingPrimitive(primitive))?;
        primitive.set_positions(&mut self.memory, positions)?;
        Ok(())
    }

    /// Getter text for one property as the active strategy stores it
    pub fn shader_property(
        &mut self,
        material_type_name: &str,
        info: &ShaderSemanticsInfo,
        is_global_data: bool,
        is_webgl2: bool,
    ) -> Option<String> {
        let ctx = strategy_context!(self);
        self.strategy
            .shader_property(&ctx, material_type_name, info, is_global_data, is_webgl2)
    }

    /// Run one frame using wall-clock time
    pub fn process_frame(&mut self, passes: &[RenderPass]) -> EngineResult<FrameReport> {
        self.clock.tick();
        self.run_frame(passes)
    }

    /// Run one frame advancing time by `delta_seconds`
    pub fn process_frame_with_delta(
        &mut self,
        passes: &[RenderPass],
        delta_seconds: f32,
    ) -> EngineResult<FrameReport> {
        self.clock.advance(delta_seconds);
        self.run_frame(passes)
    }

    fn run_frame(&mut self, passes: &[RenderPass]) -> EngineResult<FrameReport> {
        if self.is_shut_down {
            return Err(EngineError::ShutDown);
        }
        self.frame += 1;
        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };

        report.created = run_create(
            &mut self.components,
            &self.entities,
            &mut self.memory,
            &mut self.global,
        )?;
        report
            .stage_entries
            .insert(ProcessStage::Create, report.created);

        let entered = self.components.enter_stage(ProcessStage::Load);
        report.stage_entries.insert(ProcessStage::Load, entered);
        let (loaded, pending) = self.load_mesh_renderers()?;
        report.loaded = loaded;
        report.load_pending = pending;

        report.logic = run_logic(&mut self.components, &mut self.memory, &self.global)?;
        self.global.set_value(
            &mut self.memory,
            &ShaderSemantic::TIME,
            0,
            0,
            &PropertyValue::Scalar(self.clock.total_time()),
        );
        let entered = self.components.enter_stage(ProcessStage::Logic);
        report.stage_entries.insert(ProcessStage::Logic, entered);

        let entered = self.components.enter_stage(ProcessStage::PreRender);
        report.stage_entries.insert(ProcessStage::PreRender, entered);
        let mut ctx = strategy_context!(self);
        match self.strategy.prerender(&mut ctx) {
            Ok(()) => {}
            Err(err @ RenderError::DataTextureOverflow { .. }) => {
                log::warn!("Frame {}: {err}", self.frame);
                report.overflow = Some(err);
            }
            Err(err) => return Err(err.into()),
        }

        let entered = self.components.enter_stage(ProcessStage::Render);
        report.stage_entries.insert(ProcessStage::Render, entered);
        for pass in passes {
            let (draws, culled) = self.render_pass(pass)?;
            report.draws += draws;
            report.culled += culled;
            report.passes += 1;
        }

        log::trace!(
            "Frame {} done: {} draws over {} passes",
            report.frame,
            report.draws,
            report.passes
        );
        Ok(report)
    }

    /// Load meshes of renderers that are new, failed before or whose mesh
    /// changed; returns (loaded, still pending)
    ///
    /// Loaded renderers are passed to the strategy as well so vertex buffers
    /// whose position accessor was rewritten get refreshed.
    fn load_mesh_renderers(&mut self) -> EngineResult<(usize, usize)> {
        let mut loaded = 0;
        let mut pending = 0;
        for sid in self.components.store::<MeshRendererComponent>().sids() {
            let Some(renderer) = self.components.get::<MeshRendererComponent>(sid) else {
                continue;
            };
            let Some(mesh_component) = renderer
                .mesh_sid()
                .and_then(|mesh_sid| self.components.get::<MeshComponent>(mesh_sid))
            else {
                continue;
            };
            let update_count = mesh_component.update_count();
            let needs_load = renderer.needs_load(update_count);

            let mut ctx = strategy_context!(self);
            let is_loaded = self.strategy.load(&mut ctx, mesh_component)?;
            if !needs_load {
                continue;
            }
            if is_loaded {
                loaded += 1;
            } else {
                pending += 1;
            }
            if let Some(renderer) = self.components.get_mut::<MeshRendererComponent>(sid) {
                renderer.record_load(is_loaded, update_count);
            }
        }
        Ok((loaded, pending))
    }

    /// Pass with its camera resolved: the requested one, else the first
    fn resolve_pass(&self, pass: &RenderPass) -> RenderPass {
        if pass.camera_sid().is_some() {
            return pass.clone();
        }
        match self.components.store::<CameraComponent>().sids().first() {
            Some(&sid) => pass.clone().with_camera(sid),
            None => pass.clone(),
        }
    }

    /// Cull, sort and draw one pass; returns (draws issued, renderers culled)
    fn render_pass(&mut self, pass: &RenderPass) -> EngineResult<(usize, usize)> {
        let pass = self.resolve_pass(pass);
        let camera = pass
            .camera_sid()
            .and_then(|sid| self.components.get::<CameraComponent>(sid));
        let (frustum, view) = match camera {
            Some(camera) => (
                Some(camera.frustum(&self.memory)?),
                camera.view_matrix(&self.memory)?,
            ),
            None => {
                log::debug!("Pass {:?} has no camera; culling disabled", pass.uid());
                (None, Mat4::identity())
            }
        };

        let mut draws = Vec::new();
        let mut culling = Vec::new();
        for (sid, renderer) in self.components.store::<MeshRendererComponent>().iter() {
            let entity = renderer.base().entity_uid;
            if !renderer.is_loaded() || !pass.includes(entity) {
                continue;
            }
            let Some(scene_graph_sid) = renderer.scene_graph_sid() else {
                continue;
            };
            let Some(node) = self.components.get::<SceneGraphComponent>(scene_graph_sid) else {
                continue;
            };
            if !node.is_visible(&self.memory)? {
                continue;
            }
            let Some(mesh) = renderer
                .mesh_sid()
                .and_then(|mesh_sid| self.components.get::<MeshComponent>(mesh_sid))
                .and_then(MeshComponent::mesh)
                .and_then(|uid| self.meshes.mesh(uid))
            else {
                continue;
            };

            let world = node.world_matrix(&self.memory)?;
            let is_culled = match &frustum {
                Some(frustum) if pass.culls() => self
                    .meshes
                    .mesh_aabb(mesh.uid())
                    .is_some_and(|aabb| !frustum.intersects_aabb(&aabb.transformed(&world))),
                _ => false,
            };
            culling.push((sid, is_culled));

            for &primitive_uid in mesh.primitives() {
                let Some(primitive) = self.meshes.primitive(primitive_uid) else {
                    continue;
                };
                let material = primitive.material();
                let translucent = material
                    .and_then(|uid| self.materials.material(uid))
                    .is_some_and(|m| m.alpha_mode().is_translucent());
                let center = primitive.aabb().transformed(&world).center();
                draws.push(DrawItem {
                    primitive: primitive_uid,
                    material,
                    entity,
                    scene_graph_sid,
                    mesh_renderer_sid: sid,
                    sort_key: primitive.sort_key(),
                    view_depth: view_depth(&view, &center),
                    translucent,
                    culled: is_culled,
                });
            }
        }

        let mut culled = 0;
        for (sid, is_culled) in culling {
            if let Some(renderer) = self.components.get_mut::<MeshRendererComponent>(sid) {
                renderer.set_culled(is_culled);
            }
            culled += usize::from(is_culled);
        }
        sort_draw_items(&mut draws);

        self.render_tick += 1;
        let tick = self.render_tick;
        let mut ctx = strategy_context!(self);
        let issued = self
            .strategy
            .common_render(&mut ctx, &draws, &pass, tick, pass.display_idx())?;
        Ok((issued, culled))
    }

    /// Release every GPU resource; later frames fail with
    /// [`EngineError::ShutDown`]
    pub fn shutdown(&mut self) {
        if self.is_shut_down {
            return;
        }
        self.strategy.destroy(&mut self.cg);
        self.is_shut_down = true;
        log::info!("Engine shut down after {} frames", self.frame);
    }

    /// Whether [`Engine::shutdown`] ran
    pub const fn is_shut_down(&self) -> bool {
        self.is_shut_down
    }
}
