//! Per-stage systems over the built-in components
//!
//! Systems borrow the typed stores of [`ComponentRepository`] disjointly so a
//! component can read its siblings while it is being updated.

use std::collections::BTreeMap;

use crate::foundation::math::Mat4;
use crate::global_data::{GlobalDataRepository, ShaderSemantic};
use crate::memory::{MemoryManager, PropertyValue};

use super::component::{Component, ComponentSid, CreateContext};
use super::components::{CameraLogicInputs, SceneGraphComponent, TransformComponent};
use super::entity::EntityRepository;
use super::repository::{ComponentRepository, ComponentStore};
use super::stage::ProcessStage;
use super::EcsResult;

/// What the Logic stage actually recomputed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicReport {
    /// Transforms changed since the previous Logic
    pub transforms_changed: usize,
    /// Scene graph nodes whose world matrix was recomputed
    pub scene_graphs_updated: usize,
    /// Cameras whose matrices were recomputed
    pub cameras_updated: usize,
    /// Lights whose global entries were rewritten
    pub lights_updated: usize,
}

/// Run the Create hook of every component that has not been created yet
pub fn run_create(
    components: &mut ComponentRepository,
    entities: &EntityRepository,
    memory: &mut MemoryManager,
    global: &mut GlobalDataRepository,
) -> EcsResult<usize> {
    let mut created = 0;
    created += create_store(&mut components.transforms, entities, memory, global)?;
    created += create_store(&mut components.scene_graphs, entities, memory, global)?;
    created += create_store(&mut components.meshes, entities, memory, global)?;
    created += create_store(&mut components.mesh_renderers, entities, memory, global)?;
    created += create_store(&mut components.lights, entities, memory, global)?;
    created += create_store(&mut components.cameras, entities, memory, global)?;
    Ok(created)
}

fn create_store<C: Component>(
    store: &mut ComponentStore<C>,
    entities: &EntityRepository,
    memory: &mut MemoryManager,
    global: &mut GlobalDataRepository,
) -> EcsResult<usize> {
    let empty = BTreeMap::new();
    let mut created = 0;
    for (_, component) in store.iter_mut() {
        if !component.base().can_enter(ProcessStage::Create) {
            continue;
        }
        let siblings = entities
            .get(component.base().entity_uid)
            .map_or(&empty, |entity| entity.components());
        let mut ctx = CreateContext {
            memory: &mut *memory,
            global: &mut *global,
            siblings,
        };
        component.on_create(&mut ctx)?;
        component.base_mut().enter_stage(ProcessStage::Create);
        created += 1;
    }
    Ok(created)
}

/// Logic stage: transforms, scene graph (parents first), cameras, lights
pub fn run_logic(
    components: &mut ComponentRepository,
    memory: &mut MemoryManager,
    global: &GlobalDataRepository,
) -> EcsResult<LogicReport> {
    let mut report = LogicReport::default();

    for (_, transform) in components.transforms.iter_mut() {
        if transform.take_logic_change() {
            report.transforms_changed += 1;
        }
    }
    if report.transforms_changed > 0 {
        components.bump_transform_generation();
    }

    report.scene_graphs_updated =
        update_scene_graphs(&mut components.scene_graphs, &components.transforms, memory)?;

    let generation = components.transform_generation();
    for (_, camera) in components.cameras.iter_mut() {
        let (world, scene_graph_update_count) = node_world(
            camera.scene_graph_sid(),
            camera.transform_sid(),
            &components.scene_graphs,
            &components.transforms,
            memory,
        )?;
        let inputs = CameraLogicInputs {
            own_update_count: camera.update_count(),
            transform_generation: generation,
            scene_graph_update_count,
        };
        if camera.logic(memory, inputs, &world)? {
            report.cameras_updated += 1;
        }
    }

    let light_slots = global
        .property(&ShaderSemantic::LIGHT_POSITION)
        .map_or(0, |property| {
            property
                .info
                .resolved_array_length(global.default_array_length())
        });
    let mut light_count = 0;
    for (sid, light) in components.lights.iter_mut() {
        let (world, scene_graph_update_count) = node_world(
            light.scene_graph_sid(),
            None,
            &components.scene_graphs,
            &components.transforms,
            memory,
        )?;
        if light.logic(memory, global, &world, scene_graph_update_count, light_slots)? {
            report.lights_updated += 1;
        }
        light_count = light_count.max(sid.index() + 1);
    }
    let light_count = light_count.min(light_slots);
    let current = global
        .get_value(memory, &ShaderSemantic::LIGHT_NUMBER, 0, 0)
        .and_then(|value| value.as_scalar());
    if current != Some(light_count as f32) {
        global.set_value(
            memory,
            &ShaderSemantic::LIGHT_NUMBER,
            0,
            0,
            &PropertyValue::Scalar(light_count as f32),
        );
    }

    Ok(report)
}

/// World matrix of a node and the update count of its scene graph
fn node_world(
    scene_graph_sid: Option<ComponentSid>,
    transform_sid: Option<ComponentSid>,
    scene_graphs: &ComponentStore<SceneGraphComponent>,
    transforms: &ComponentStore<TransformComponent>,
    memory: &MemoryManager,
) -> EcsResult<(Mat4, u64)> {
    if let Some(node) = scene_graph_sid.and_then(|sid| scene_graphs.get(sid)) {
        return Ok((node.world_matrix(memory)?, node.update_count()));
    }
    match transform_sid.and_then(|sid| transforms.get(sid)) {
        Some(transform) => Ok((transform.local_matrix(memory)?, 0)),
        None => Ok((Mat4::identity(), 0)),
    }
}

/// Nodes ordered parents first, then by SID
pub fn hierarchy_order(scene_graphs: &ComponentStore<SceneGraphComponent>) -> Vec<ComponentSid> {
    let max_depth = scene_graphs.len();
    let mut ordered: Vec<(usize, ComponentSid)> = scene_graphs
        .iter()
        .map(|(sid, node)| {
            let mut depth = 0;
            let mut parent = node.parent();
            while let Some(parent_sid) = parent {
                depth += 1;
                if depth > max_depth {
                    log::warn!("Scene graph cycle through sid {}", sid.0);
                    break;
                }
                parent = scene_graphs.get(parent_sid).and_then(SceneGraphComponent::parent);
            }
            (depth, sid)
        })
        .collect();
    ordered.sort_unstable();
    ordered.into_iter().map(|(_, sid)| sid).collect()
}

fn update_scene_graphs(
    scene_graphs: &mut ComponentStore<SceneGraphComponent>,
    transforms: &ComponentStore<TransformComponent>,
    memory: &mut MemoryManager,
) -> EcsResult<usize> {
    let mut updated = 0;
    for sid in hierarchy_order(scene_graphs) {
        let Some(node) = scene_graphs.get(sid) else {
            continue;
        };
        let (local, transform_count) = match node.transform_sid().and_then(|t| transforms.get(t)) {
            Some(transform) => (transform.local_matrix(memory)?, transform.update_count()),
            None => (Mat4::identity(), 0),
        };
        let (parent_world, parent_count) = match node.parent().and_then(|p| scene_graphs.get(p)) {
            Some(parent) => (parent.world_matrix(memory)?, parent.update_count()),
            None => (Mat4::identity(), 0),
        };
        if !node.needs_update(transform_count, parent_count) {
            continue;
        }
        let world = parent_world * local;
        if let Some(node) = scene_graphs.get_mut(sid) {
            node.apply_world(memory, &world, transform_count, parent_count)?;
            updated += 1;
        }
    }
    Ok(updated)
}
