//! Scene demo
//!
//! Builds a small scene (a ring of spinning triangles, a translucent pane,
//! two lights and a camera) and drives it for a few frames through every
//! upload strategy against the recording backend. Pass a `.toml` or `.ron`
//! engine config path as the first argument to override the defaults.

use scene_engine::prelude::*;

const FRAMES: u32 = 5;
const RING: usize = 6;

const VERTEX_SHADER: &str = "void main() { gl_Position = vec4(0.0); }";
const FRAGMENT_SHADER: &str = "void main() {}";

struct DemoScene {
    engine: Engine<RecordingCgApi>,
    spinners: Vec<EntityUid>,
}

impl DemoScene {
    fn new(config: EngineConfig) -> EngineResult<Self> {
        let mut engine = Engine::new(config, RecordingCgApi::new())?;

        engine.register_material_type(
            "unlit",
            vec![ShaderSemanticsInfo::new(
                ShaderSemantic::BASE_COLOR_FACTOR,
                CompositionType::Vec4,
            )],
            ShaderSource::new(VERTEX_SHADER, FRAGMENT_SHADER),
        )?;
        let solid = engine.create_material("unlit")?;
        engine.set_material_parameter(
            solid,
            &ShaderSemantic::BASE_COLOR_FACTOR,
            &PropertyValue::Vec4(Vec4::new(0.8, 0.7, 0.5, 1.0)),
        )?;
        let glass = engine.create_material("unlit")?;
        engine.set_material_parameter(
            glass,
            &ShaderSemantic::BASE_COLOR_FACTOR,
            &PropertyValue::Vec4(Vec4::new(0.3, 0.6, 0.9, 0.4)),
        )?;
        if let Some(material) = engine.materials_mut().material_mut(glass) {
            material.set_alpha_mode(AlphaMode::Translucent);
        }

        let triangle = vec![-0.5, -0.5, 0.0, 0.5, -0.5, 0.0, 0.0, 0.5, 0.0];
        let solid_primitive = engine.create_primitive(
            PrimitiveDesc::triangles(triangle.clone(), vec![0, 1, 2]).with_material(solid),
        )?;
        let glass_primitive = engine
            .create_primitive(PrimitiveDesc::triangles(triangle, vec![0, 1, 2]).with_material(glass))?;
        let solid_mesh = engine.create_mesh(vec![solid_primitive])?;
        let glass_mesh = engine.create_mesh(vec![glass_primitive])?;

        let mut spinners = Vec::with_capacity(RING);
        for i in 0..RING {
            let angle = i as f32 / RING as f32 * std::f32::consts::TAU;
            let uid = engine.create_mesh_entity(solid_mesh)?;
            let position = Vec3::new(angle.cos() * 3.0, angle.sin() * 3.0, 0.0);
            engine.update_component::<TransformComponent, _>(uid, |transform, memory| {
                transform.set_translate(memory, position)
            })?;
            spinners.push(uid);
        }

        let pane = engine.create_mesh_entity(glass_mesh)?;
        engine.update_component::<TransformComponent, _>(pane, |transform, memory| {
            transform.set_scale(memory, Vec3::new(4.0, 4.0, 1.0))?;
            transform.set_translate(memory, Vec3::new(0.0, 0.0, 2.0))
        })?;

        for (light_type, color) in [
            (LightType::Directional, Vec3::new(1.0, 1.0, 0.9)),
            (LightType::Point, Vec3::new(0.4, 0.4, 1.0)),
        ] {
            let uid = engine.create_light_entity(light_type)?;
            engine.update_component::<LightComponent, _>(uid, |light, memory| {
                light.set_color(memory, color)?;
                light.set_intensity(memory, 2.0)
            })?;
        }

        let camera = engine.create_camera_entity()?;
        engine.update_component::<CameraComponent, _>(camera, |camera, memory| {
            camera.set_perspective(memory, 45.0, 800.0 / 600.0, 0.1, 100.0)
        })?;
        engine.update_component::<TransformComponent, _>(camera, |transform, memory| {
            transform.set_translate(memory, Vec3::new(0.0, 0.0, 12.0))
        })?;

        Ok(Self { engine, spinners })
    }

    fn spin(&mut self, frame: u32) -> EngineResult<()> {
        let rotation = Quat::from_axis_angle(&Vec3::z_axis(), frame as f32 * 0.25);
        for &uid in &self.spinners {
            self.engine
                .update_component::<TransformComponent, _>(uid, |transform, memory| {
                    transform.set_rotate(memory, rotation)
                })?;
        }
        Ok(())
    }

    fn run(&mut self, frames: u32) -> EngineResult<()> {
        let passes = [RenderPass::new(RenderPassUid(0))];
        for frame in 0..frames {
            self.spin(frame)?;
            let report = self.engine.process_frame_with_delta(&passes, 1.0 / 60.0)?;
            log::info!(
                "[{}] frame {}: created {}, loaded {}, scene graphs {}, draws {}, culled {}",
                self.engine.config().strategy,
                report.frame,
                report.created,
                report.loaded,
                report.logic.scene_graphs_updated,
                report.draws,
                report.culled
            );
            if let Some(overflow) = &report.overflow {
                log::warn!("[{}] {}", self.engine.config().strategy, overflow);
            }
        }

        let cg = self.engine.cg();
        log::info!(
            "[{}] {} programs, {} buffers, {} textures, {} commands recorded",
            self.engine.config().strategy,
            cg.program_count(),
            cg.buffer_count(),
            cg.texture_count(),
            cg.commands().len()
        );
        Ok(())
    }
}

fn main() -> EngineResult<()> {
    let config_path = std::env::args().nth(1);
    let base = match &config_path {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };
    logging::init_with_level(&base.log_level);
    log::info!("Starting scene demo...");
    if let Some(path) = &config_path {
        log::info!("Engine config loaded from {}", path);
    }

    for strategy in [StrategyKind::Uniform, StrategyKind::DataTexture, StrategyKind::WebGpu] {
        let mut scene = DemoScene::new(base.clone().with_strategy(strategy))?;
        scene.run(FRAMES)?;
        scene.engine.shutdown();
    }

    log::info!("Scene demo finished");
    Ok(())
}
