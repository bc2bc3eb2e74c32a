//! End-to-end rendering through [`Engine`] with the recording backend

use approx::assert_relative_eq;

use crate::core::{DataTextureConfig, EngineConfig, EngineLimits, StrategyKind};
use crate::ecs::components::{SceneGraphComponent, TransformComponent};
use crate::ecs::{Component, ComponentTid, EntityUid};
use crate::foundation::math::utils::align_up;
use crate::foundation::math::{Mat4, Vec3};
use crate::global_data::{ShaderSemantic, ShaderSemanticsInfo};
use crate::memory::{BufferUse, CompositionType};
use crate::render::{
    AlphaMode, BufferKind, CgCommand, MaterialUid, MeshUid, PrimitiveDesc, PrimitiveUid,
    RecordingCgApi, RenderError, RenderPass, RenderPassUid, RenderingStrategy, ShaderSource,
    UniformValue,
};
use crate::{Engine, EngineError};

const VERTEX: &str = "void main() { gl_Position = vec4(0.0); }";
const FRAGMENT: &str = "void main() {}";

fn config(strategy: StrategyKind) -> EngineConfig {
    EngineConfig::new()
        .with_strategy(strategy)
        .with_limits(EngineLimits {
            max_components_per_view: 16,
            ..EngineLimits::default()
        })
        .with_data_texture(DataTextureConfig::default().with_size(256, 256))
}

struct Scene {
    engine: Engine<RecordingCgApi>,
    material: MaterialUid,
    primitive: PrimitiveUid,
    mesh: MeshUid,
}

fn triangle() -> Vec<f32> {
    vec![-0.5, -0.5, 0.0, 0.5, -0.5, 0.0, 0.0, 0.5, 0.0]
}

fn scene(config: EngineConfig) -> Scene {
    let mut engine = Engine::new(config, RecordingCgApi::new()).unwrap();
    engine
        .register_material_type(
            "unlit",
            vec![ShaderSemanticsInfo::new(
                ShaderSemantic::BASE_COLOR_FACTOR,
                CompositionType::Vec4,
            )],
            ShaderSource::new(VERTEX, FRAGMENT),
        )
        .unwrap();
    let material = engine.create_material("unlit").unwrap();
    let primitive = engine
        .create_primitive(
            PrimitiveDesc::triangles(triangle(), vec![0, 1, 2]).with_material(material),
        )
        .unwrap();
    let mesh = engine.create_mesh(vec![primitive]).unwrap();
    Scene {
        engine,
        material,
        primitive,
        mesh,
    }
}

fn place(engine: &mut Engine<RecordingCgApi>, uid: EntityUid, position: Vec3) {
    engine
        .update_component::<TransformComponent, _>(uid, |transform, memory| {
            transform.set_translate(memory, position)
        })
        .unwrap();
}

fn add_camera(engine: &mut Engine<RecordingCgApi>, z: f32) -> EntityUid {
    let uid = engine.create_camera_entity().unwrap();
    place(engine, uid, Vec3::new(0.0, 0.0, z));
    uid
}

fn pass() -> RenderPass {
    RenderPass::new(RenderPassUid(0))
}

/// `(offset, stride)` of `int vec4_idx = offset + stride * instanceId;` in a getter
fn baked_offset_and_stride(source: &str, getter: &str) -> (usize, usize) {
    let start = source.find(&format!(" {getter}(")).unwrap();
    let line = source[start..]
        .lines()
        .find(|line| line.trim_start().starts_with("int vec4_idx"))
        .unwrap();
    let expression = line.split('=').nth(1).unwrap().trim().trim_end_matches(';');
    let mut terms = expression.split('+').map(str::trim);
    let offset = terms.next().unwrap().parse().unwrap();
    let stride = terms
        .next()
        .unwrap()
        .split('*')
        .next()
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    (offset, stride)
}

fn vertex_buffers_created(cg: &RecordingCgApi) -> usize {
    cg.commands()
        .iter()
        .filter(|c| matches!(c, CgCommand::CreateBuffer(_, BufferKind::Vertex, _)))
        .count()
}

#[test]
fn test_world_matrix_read_back_through_baked_address() {
    let Scene {
        mut engine,
        material,
        mesh,
        ..
    } = scene(config(StrategyKind::DataTexture));
    let a = engine.create_mesh_entity(mesh).unwrap();
    let b = engine.create_mesh_entity(mesh).unwrap();
    place(&mut engine, a, Vec3::new(1.0, 2.0, 0.0));
    place(&mut engine, b, Vec3::new(-1.0, 0.0, -3.0));
    add_camera(&mut engine, 10.0);

    let report = engine.process_frame(&[pass()]).unwrap();
    assert_eq!(report.draws, 2);
    assert!(report.overflow.is_none());

    let program = engine
        .materials()
        .material(material)
        .unwrap()
        .program(StrategyKind::DataTexture)
        .unwrap();
    let source = &engine.cg().program(program).unwrap().vertex;
    let (offset, stride) = baked_offset_and_stride(source, "get_worldMatrix");
    assert_eq!(
        engine
            .registry()
            .location_of_member(ComponentTid::SCENE_GRAPH, "worldMatrix")
            .unwrap()
            .chunks[0]
            .vec4_offset,
        offset
    );

    let texture = engine.strategy().as_data_texture().unwrap().texture().unwrap();
    let texels = engine.cg().texture_texels(texture).unwrap();
    for (uid, translation) in [(a, Vec3::new(1.0, 2.0, 0.0)), (b, Vec3::new(-1.0, 0.0, -3.0))] {
        let node = engine.component::<SceneGraphComponent>(uid).unwrap();
        let start = (offset + stride * node.base().component_sid.index()) * 4;
        let fetched = Mat4::from_column_slice(&texels[start..start + 16]);
        assert_relative_eq!(fetched, node.world_matrix(engine.memory()).unwrap());
        assert_relative_eq!(fetched.fixed_view::<3, 1>(0, 3).into_owned(), translation);
    }
}

#[test]
fn test_data_texture_holds_instance_padding_vertex() {
    let Scene { mut engine, mesh, .. } = scene(config(StrategyKind::DataTexture));
    engine.create_mesh_entity(mesh).unwrap();
    add_camera(&mut engine, 10.0);
    engine.process_frame(&[pass()]).unwrap();

    let instance = engine
        .memory()
        .buffer(BufferUse::GpuInstanceData)
        .taken_byte_index();
    let vertex_buffer = engine.memory().buffer(BufferUse::GpuVertexData);
    let vertex = vertex_buffer.taken_byte_index();
    let strategy = engine.strategy().as_data_texture().unwrap();
    let layout = *strategy.layout().unwrap();

    assert_eq!(layout.instance_bytes(), instance);
    assert_eq!(layout.padding(), align_up(instance, 16) - instance);
    assert_eq!(layout.vertex_bytes(), vertex);
    assert_eq!(layout.payload_bytes(), instance + layout.padding() + vertex);
    assert!(!strategy.vertex_data_dropped());

    let texels = engine
        .cg()
        .texture_texels(strategy.texture().unwrap())
        .unwrap();
    let start = layout.vertex_texel_offset() * 4;
    assert_eq!(
        &texels[start..start + vertex / 4],
        &vertex_buffer.as_words()[..vertex / 4]
    );
}

#[test]
fn test_texture_recreated_only_when_layout_moves() {
    let Scene { mut engine, mesh, .. } = scene(config(StrategyKind::DataTexture));
    engine.create_mesh_entity(mesh).unwrap();
    add_camera(&mut engine, 10.0);
    engine.process_frame(&[pass()]).unwrap();
    let first = engine.strategy().as_data_texture().unwrap().texture().unwrap();

    engine.cg_mut().clear_commands();
    engine.process_frame(&[pass()]).unwrap();
    assert!(!engine
        .cg()
        .commands()
        .iter()
        .any(|c| matches!(c, CgCommand::CreateTexture(..))));
    assert_eq!(
        engine.strategy().as_data_texture().unwrap().texture(),
        Some(first)
    );

    // a new material type takes instance memory and moves the vertex region
    engine
        .register_material_type(
            "tinted",
            vec![ShaderSemanticsInfo::new(
                ShaderSemantic::BASE_COLOR_FACTOR,
                CompositionType::Vec4,
            )],
            ShaderSource::new(VERTEX, FRAGMENT),
        )
        .unwrap();
    engine.cg_mut().clear_commands();
    engine.process_frame(&[pass()]).unwrap();
    assert!(engine
        .cg()
        .commands()
        .contains(&CgCommand::DeleteTexture(first)));
    assert_eq!(engine.cg().texture_count(), 1);
}

#[test]
fn test_data_texture_overflow_skips_drawing() {
    let config = config(StrategyKind::DataTexture)
        .with_data_texture(DataTextureConfig::default().with_size(4, 4));
    let Scene { mut engine, mesh, .. } = scene(config);
    engine.create_mesh_entity(mesh).unwrap();
    add_camera(&mut engine, 10.0);

    let report = engine.process_frame(&[pass()]).unwrap();
    match report.overflow {
        Some(RenderError::DataTextureOverflow { required, capacity }) => {
            assert_eq!(capacity, 4 * 4 * 16);
            assert!(required > capacity);
        }
        other => panic!("expected overflow, got {other:?}"),
    }
    assert_eq!(report.draws, 0);
    assert!(engine.cg().draws().is_empty());
    assert!(engine.strategy().as_data_texture().unwrap().is_skipping_draws());
}

#[test]
fn test_overflow_drops_vertex_data_first() {
    let build = |config: EngineConfig| {
        let Scene { mut engine, mesh, .. } = scene(config);
        engine.create_mesh_entity(mesh).unwrap();
        add_camera(&mut engine, 10.0);
        engine
    };

    let mut probe = build(config(StrategyKind::DataTexture));
    probe.process_frame(&[pass()]).unwrap();
    let instance = probe
        .memory()
        .buffer(BufferUse::GpuInstanceData)
        .taken_byte_index();

    // exactly enough texels for the instance data
    let width = align_up(instance, 16) / 16;
    let mut engine = build(
        config(StrategyKind::DataTexture)
            .with_data_texture(DataTextureConfig::default().with_size(width, 1)),
    );
    let report = engine.process_frame(&[pass()]).unwrap();

    assert!(report.overflow.is_none());
    assert_eq!(report.draws, 1);
    let strategy = engine.strategy().as_data_texture().unwrap();
    assert!(strategy.vertex_data_dropped());
    assert_eq!(strategy.layout().unwrap().vertex_bytes(), 0);
}

#[test]
fn test_draw_order_opaque_then_translucent() {
    let Scene {
        mut engine,
        mesh: opaque_mesh,
        ..
    } = scene(config(StrategyKind::WebGpu));
    let glass = engine.create_material("unlit").unwrap();
    engine
        .materials_mut()
        .material_mut(glass)
        .unwrap()
        .set_alpha_mode(AlphaMode::Translucent);
    let glass_primitive = engine
        .create_primitive(PrimitiveDesc::triangles(triangle(), vec![0, 1, 2]).with_material(glass))
        .unwrap();
    let glass_mesh = engine.create_mesh(vec![glass_primitive]).unwrap();

    let entities = [
        (opaque_mesh, 0.0),
        (opaque_mesh, 5.0),
        (glass_mesh, -5.0),
        (glass_mesh, 2.0),
    ];
    for (mesh, z) in entities {
        let uid = engine.create_mesh_entity(mesh).unwrap();
        place(&mut engine, uid, Vec3::new(0.0, 0.0, z));
    }
    add_camera(&mut engine, 10.0);

    engine.process_frame(&[pass()]).unwrap();
    let order: Vec<u32> = engine
        .cg()
        .draws()
        .iter()
        .map(|call| call.first_instance)
        .collect();
    // scene graph SIDs: near opaque, far opaque, far translucent, near translucent
    assert_eq!(order, vec![1, 0, 2, 3]);
}

#[test]
fn test_storage_buffer_mirrors_instance_data() {
    let Scene { mut engine, mesh, .. } = scene(config(StrategyKind::WebGpu));
    engine.create_mesh_entity(mesh).unwrap();
    add_camera(&mut engine, 10.0);
    engine.process_frame(&[pass()]).unwrap();

    let storage = match engine.strategy() {
        RenderingStrategy::WebGpu(strategy) => strategy.storage_buffer().unwrap(),
        _ => unreachable!(),
    };
    let instance = engine.memory().buffer(BufferUse::GpuInstanceData);
    let taken = instance.taken_byte_index();
    let bytes = engine.cg().buffer_bytes(storage).unwrap();
    assert_eq!(bytes.len(), align_up(taken, 16));
    assert_eq!(&bytes[..taken], &instance.as_bytes()[..taken]);
    assert_eq!(engine.cg().buffer_kind(storage), Some(BufferKind::Storage));
    assert!(engine
        .cg()
        .commands()
        .iter()
        .any(|c| matches!(c, CgCommand::SetBindGroup(0, _))));
}

#[test]
fn test_uniform_strategy_culls_and_uploads_instance() {
    let Scene { mut engine, mesh, .. } = scene(config(StrategyKind::Uniform));
    let visible = engine.create_mesh_entity(mesh).unwrap();
    let behind = engine.create_mesh_entity(mesh).unwrap();
    place(&mut engine, visible, Vec3::new(0.5, 0.0, 0.0));
    place(&mut engine, behind, Vec3::new(0.0, 0.0, 20.0));
    add_camera(&mut engine, 10.0);

    let report = engine.process_frame(&[pass()]).unwrap();
    assert_eq!(report.draws, 1);
    assert_eq!(report.culled, 1);

    let node = engine.component::<SceneGraphComponent>(visible).unwrap();
    let world = node.world_matrix(engine.memory()).unwrap();
    assert_eq!(
        engine.cg().last_uniform("u_worldMatrix"),
        Some(&UniformValue::Mat4(world))
    );
    match engine.cg().last_uniform("u_currentComponentSIDs") {
        Some(UniformValue::IntArray(sids)) => {
            assert_eq!(
                sids[ComponentTid::SCENE_GRAPH.index()],
                node.base().component_sid.index() as i32
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_component_sids_are_a_per_draw_uniform() {
    for (kind, declaration) in [
        (StrategyKind::DataTexture, "uniform int u_currentComponentSIDs[7];"),
        (
            StrategyKind::WebGpu,
            "var<uniform> u_currentComponentSIDs: array<vec4<i32>, 2>;",
        ),
    ] {
        let Scene {
            mut engine,
            material,
            mesh,
            ..
        } = scene(config(kind));
        let behind = engine.create_mesh_entity(mesh).unwrap();
        let drawn = engine.create_mesh_entity(mesh).unwrap();
        place(&mut engine, behind, Vec3::new(0.0, 0.0, 20.0));
        place(&mut engine, drawn, Vec3::new(0.5, 0.0, 0.0));
        add_camera(&mut engine, 10.0);

        let report = engine.process_frame(&[pass()]).unwrap();
        assert_eq!(report.draws, 1);

        let program = engine
            .materials()
            .material(material)
            .unwrap()
            .program(kind)
            .unwrap();
        let source = &engine.cg().program(program).unwrap().vertex;
        assert!(source.contains(declaration), "{kind:?}");
        let getter = source.find("get_currentComponentSIDs(").unwrap();
        let body = source[getter..].split('}').next().unwrap();
        assert!(!body.contains("fetch"), "{kind:?}");

        let sid = engine
            .entities()
            .component_sid::<SceneGraphComponent>(drawn)
            .unwrap();
        assert_eq!(sid.index(), 1);
        match engine.cg().last_uniform("u_currentComponentSIDs") {
            Some(UniformValue::IntArray(sids)) => {
                assert_eq!(sids.len(), ComponentTid::COUNT);
                assert_eq!(sids[ComponentTid::SCENE_GRAPH.index()], 1);
                assert_eq!(sids[ComponentTid::LIGHT.index()], -1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn test_failed_shader_falls_back_to_last_working_source() {
    let Scene {
        mut engine, mesh, ..
    } = scene(config(StrategyKind::Uniform));
    engine.create_mesh_entity(mesh).unwrap();
    add_camera(&mut engine, 10.0);
    engine.process_frame(&[pass()]).unwrap();
    let builds = engine.strategy().state().program_builds();

    engine
        .materials_mut()
        .set_shader_source("unlit", ShaderSource::new("BROKEN", FRAGMENT))
        .unwrap();
    engine.cg_mut().fail_programs_containing("BROKEN");
    let report = engine.process_frame(&[pass()]).unwrap();

    assert_eq!(report.draws, 1);
    assert_eq!(engine.strategy().state().program_builds(), builds + 1);
    let restored = engine.materials().material_type("unlit").unwrap().shader();
    assert_eq!(restored.vertex, VERTEX);

    // the restored program is cached
    engine.process_frame(&[pass()]).unwrap();
    assert_eq!(engine.strategy().state().program_builds(), builds + 1);
}

#[test]
fn test_shader_without_backup_skips_primitive() {
    let mut engine = Engine::new(config(StrategyKind::Uniform), RecordingCgApi::new()).unwrap();
    engine
        .register_material_type("broken", vec![], ShaderSource::new("BROKEN", FRAGMENT))
        .unwrap();
    engine.cg_mut().fail_programs_containing("BROKEN");
    let material = engine.create_material("broken").unwrap();
    let primitive = engine
        .create_primitive(
            PrimitiveDesc::triangles(triangle(), vec![0, 1, 2]).with_material(material),
        )
        .unwrap();
    let mesh = engine.create_mesh(vec![primitive]).unwrap();
    engine.create_mesh_entity(mesh).unwrap();
    add_camera(&mut engine, 10.0);

    let report = engine.process_frame(&[pass()]).unwrap();
    assert_eq!(report.draws, 0);
    assert_eq!(engine.cg().program_count(), 0);
}

#[test]
fn test_vertex_buffers_follow_position_version() {
    let Scene {
        mut engine,
        mesh,
        primitive,
        ..
    } = scene(config(StrategyKind::Uniform));
    engine.create_mesh_entity(mesh).unwrap();
    add_camera(&mut engine, 10.0);

    engine.process_frame(&[pass()]).unwrap();
    assert_eq!(vertex_buffers_created(engine.cg()), 1);

    engine.cg_mut().clear_commands();
    engine.process_frame(&[pass()]).unwrap();
    assert_eq!(vertex_buffers_created(engine.cg()), 0);

    let moved: Vec<f32> = triangle().iter().map(|v| v * 2.0).collect();
    engine.set_primitive_positions(primitive, &moved).unwrap();
    engine.cg_mut().clear_commands();
    engine.process_frame(&[pass()]).unwrap();
    assert_eq!(vertex_buffers_created(engine.cg()), 1);

    let version = engine
        .meshes()
        .primitive(primitive)
        .unwrap()
        .position_accessor_version(engine.memory())
        .unwrap();
    let buffers = engine.strategy().state().vertex_buffers(primitive).unwrap();
    assert_eq!(buffers.position_version, version);
    let bytes = engine.cg().buffer_bytes(buffers.position).unwrap();
    let uploaded: &[f32] = bytemuck::cast_slice(bytes);
    assert_eq!(uploaded, moved.as_slice());
}

#[test]
fn test_shutdown_releases_everything() {
    for strategy in [StrategyKind::Uniform, StrategyKind::DataTexture, StrategyKind::WebGpu] {
        let Scene { mut engine, mesh, .. } = scene(config(strategy));
        engine.create_mesh_entity(mesh).unwrap();
        add_camera(&mut engine, 10.0);
        engine.process_frame(&[pass()]).unwrap();
        assert!(engine.cg().program_count() > 0, "{strategy}");

        engine.shutdown();
        assert_eq!(engine.cg().program_count(), 0, "{strategy}");
        assert_eq!(engine.cg().buffer_count(), 0, "{strategy}");
        assert_eq!(engine.cg().texture_count(), 0, "{strategy}");
        assert!(matches!(
            engine.process_frame(&[pass()]),
            Err(EngineError::ShutDown)
        ));
    }
}
