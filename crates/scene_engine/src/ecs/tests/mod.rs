//! Component lifecycles driven by whole frames

use approx::assert_relative_eq;

use crate::core::{EngineConfig, EngineLimits, StrategyKind};
use crate::ecs::components::{
    LightComponent, LightType, MeshComponent, MeshRendererComponent, SceneGraphComponent,
    TransformComponent,
};
use crate::ecs::{Component, ComponentTid, EntityUid, ProcessStage};
use crate::foundation::math::Vec3;
use crate::global_data::ShaderSemantic;
use crate::memory::BufferUse;
use crate::render::{
    MeshUid, PrimitiveDesc, RecordingCgApi, RenderPass, RenderPassUid, ShaderSource,
};
use crate::Engine;

fn engine() -> (Engine<RecordingCgApi>, MeshUid) {
    let config = EngineConfig::new()
        .with_strategy(StrategyKind::Uniform)
        .with_limits(EngineLimits {
            max_components_per_view: 8,
            ..EngineLimits::default()
        });
    let mut engine = Engine::new(config, RecordingCgApi::new()).unwrap();
    engine
        .register_material_type(
            "plain",
            vec![],
            ShaderSource::new("void main() {}", "void main() {}"),
        )
        .unwrap();
    let material = engine.create_material("plain").unwrap();
    let primitive = engine
        .create_primitive(
            PrimitiveDesc::triangles(
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                vec![0, 1, 2],
            )
            .with_material(material),
        )
        .unwrap();
    let mesh = engine.create_mesh(vec![primitive]).unwrap();
    (engine, mesh)
}

fn frame(engine: &mut Engine<RecordingCgApi>) -> crate::FrameReport {
    engine
        .process_frame_with_delta(&[RenderPass::new(RenderPassUid(0))], 1.0 / 60.0)
        .unwrap()
}

fn move_to(engine: &mut Engine<RecordingCgApi>, uid: EntityUid, position: Vec3) {
    engine
        .update_component::<TransformComponent, _>(uid, |transform, memory| {
            transform.set_translate(memory, position)
        })
        .unwrap();
}

fn light_number(engine: &Engine<RecordingCgApi>) -> Option<f32> {
    engine
        .global()
        .get_value(engine.memory(), &ShaderSemantic::LIGHT_NUMBER, 0, 0)
        .and_then(|value| value.as_scalar())
}

#[test]
fn test_stage_order_first_frame_then_steady() {
    let (mut engine, mesh) = engine();
    let uid = engine.create_mesh_entity(mesh).unwrap();
    engine.create_camera_entity().unwrap();

    let first = frame(&mut engine);
    // mesh entity: transform, scene graph, mesh, renderer; camera: transform, scene graph, camera
    assert_eq!(first.created, 7);
    assert_eq!(first.stage_entries[&ProcessStage::Create], 7);
    assert_eq!(first.stage_entries[&ProcessStage::Render], 7);
    assert_eq!(first.loaded, 1);

    let second = frame(&mut engine);
    assert_eq!(second.created, 0);
    assert_eq!(second.loaded, 0);
    assert_eq!(second.stage_entries.get(&ProcessStage::Create).copied().unwrap_or(0), 0);
    assert_eq!(second.stage_entries[&ProcessStage::Logic], 7);

    let transform = engine.component::<TransformComponent>(uid).unwrap();
    let stages = transform.base().stages();
    assert_eq!(stages.count(ProcessStage::Create), 1);
    assert_eq!(stages.count(ProcessStage::Load), 1);
    assert_eq!(stages.count(ProcessStage::Logic), 2);
    assert_eq!(stages.count(ProcessStage::Render), 2);
    assert_eq!(stages.last(), Some(ProcessStage::Render));

    let renderer = engine.component::<MeshRendererComponent>(uid).unwrap();
    assert!(renderer.is_loaded());
    assert_eq!(renderer.load_attempts(), 1);
}

#[test]
fn test_unchanged_frame_skips_logic_work() {
    let (mut engine, mesh) = engine();
    let uid = engine.create_mesh_entity(mesh).unwrap();
    engine.create_camera_entity().unwrap();

    let first = frame(&mut engine);
    assert!(first.logic.scene_graphs_updated > 0);

    let idle = frame(&mut engine);
    assert_eq!(idle.logic.transforms_changed, 0);
    assert_eq!(idle.logic.scene_graphs_updated, 0);
    assert_eq!(idle.logic.cameras_updated, 0);

    move_to(&mut engine, uid, Vec3::new(0.0, 3.0, 0.0));
    let moved = frame(&mut engine);
    assert_eq!(moved.logic.transforms_changed, 1);
    assert_eq!(moved.logic.scene_graphs_updated, 1);

    let node = engine.component::<SceneGraphComponent>(uid).unwrap();
    assert_relative_eq!(
        node.world_position(engine.memory()).unwrap(),
        Vec3::new(0.0, 3.0, 0.0)
    );
}

#[test]
fn test_child_world_follows_parent() {
    let (mut engine, mesh) = engine();
    let parent = engine.create_mesh_entity(mesh).unwrap();
    let child = engine.create_mesh_entity(mesh).unwrap();
    let parent_node = engine
        .entities()
        .component_sid::<SceneGraphComponent>(parent)
        .unwrap();
    engine
        .update_component::<SceneGraphComponent, _>(child, |node, _| {
            node.set_parent(Some(parent_node));
            Ok(())
        })
        .unwrap();
    move_to(&mut engine, parent, Vec3::new(1.0, 0.0, 0.0));
    move_to(&mut engine, child, Vec3::new(0.0, 2.0, 0.0));
    frame(&mut engine);

    let world = |engine: &Engine<RecordingCgApi>, uid| {
        engine
            .component::<SceneGraphComponent>(uid)
            .unwrap()
            .world_position(engine.memory())
            .unwrap()
    };
    assert_relative_eq!(world(&engine, child), Vec3::new(1.0, 2.0, 0.0));

    move_to(&mut engine, parent, Vec3::new(-4.0, 0.0, 0.0));
    frame(&mut engine);
    assert_relative_eq!(world(&engine, child), Vec3::new(-4.0, 2.0, 0.0));
}

#[test]
fn test_reused_sid_keeps_byte_offsets() {
    let (mut engine, mesh) = engine();
    let first = engine.create_mesh_entity(mesh).unwrap();
    frame(&mut engine);

    let sid = engine
        .entities()
        .component_sid::<SceneGraphComponent>(first)
        .unwrap();
    let offsets = engine
        .registry()
        .byte_offsets_for_member(ComponentTid::SCENE_GRAPH, "worldMatrix");
    let taken = engine
        .memory()
        .buffer(BufferUse::GpuInstanceData)
        .taken_byte_index();

    engine.destroy_entity(first).unwrap();
    let second = engine.create_mesh_entity(mesh).unwrap();
    let reused = engine.component::<SceneGraphComponent>(second).unwrap();

    assert_eq!(reused.base().component_sid, sid);
    assert!(reused.base().is_reuse);
    assert_eq!(
        engine
            .registry()
            .byte_offsets_for_member(ComponentTid::SCENE_GRAPH, "worldMatrix"),
        offsets
    );
    assert_eq!(
        engine
            .memory()
            .buffer(BufferUse::GpuInstanceData)
            .taken_byte_index(),
        taken
    );

    // the reused slot starts its lifecycle over with fresh stage counts
    let report = frame(&mut engine);
    assert_eq!(report.created, 4);
    let stages = engine.component::<SceneGraphComponent>(second).unwrap().base().stages();
    assert_eq!(stages.count(ProcessStage::Create), 1);
    assert_eq!(stages.count(ProcessStage::Logic), 1);
    assert!(engine.component::<MeshComponent>(second).unwrap().mesh().is_some());
}

#[test]
fn test_light_number_tracks_highest_light() {
    let (mut engine, _) = engine();
    engine.create_light_entity(LightType::Point).unwrap();
    let second = engine.create_light_entity(LightType::Directional).unwrap();
    frame(&mut engine);
    assert_eq!(light_number(&engine), Some(2.0));
    assert_eq!(engine.components().store::<LightComponent>().len(), 2);

    engine.destroy_entity(second).unwrap();
    frame(&mut engine);
    assert_eq!(light_number(&engine), Some(1.0));
}

#[test]
fn test_light_number_capped_at_light_slots() {
    let (mut engine, _) = engine();
    let max_lights = EngineLimits::default().max_lights;
    let mut lights = Vec::new();
    for _ in 0..max_lights + 2 {
        lights.push(engine.create_light_entity(LightType::Point).unwrap());
    }
    let report = frame(&mut engine);

    assert_eq!(light_number(&engine), Some(max_lights as f32));
    assert_eq!(report.logic.lights_updated, max_lights);
    let last = engine.component::<LightComponent>(lights[max_lights + 1]).unwrap();
    assert!(last.is_dropped());
    let first = engine.component::<LightComponent>(lights[0]).unwrap();
    assert!(!first.is_dropped());
}
