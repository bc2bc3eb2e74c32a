//! # Scene Engine
//!
//! A retained-mode 3D scene engine whose component data lives in a few large
//! typed byte buffers, so it can be shipped to the GPU in one piece.
//!
//! ## Features
//!
//! - **Packed component memory**: buffers, buffer views and accessors with
//!   deterministic vec4 offsets
//! - **ECS**: typed components, capability-table entities, staged processing
//! - **Global shader data**: camera, light, bone and time properties
//! - **Generated shader getters** that read instance memory at baked offsets
//! - **Three upload strategies**: per-draw uniforms, a float data texture or a
//!   storage buffer, behind one narrow device trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let config = EngineConfig::default().with_strategy(StrategyKind::DataTexture);
//!     let mut engine = Engine::new(config, RecordingCgApi::new())?;
//!
//!     engine.register_material_type(
//!         "unlit",
//!         vec![],
//!         ShaderSource::new("void main() {}", "void main() {}"),
//!     )?;
//!     let material = engine.create_material("unlit")?;
//!     let triangle = engine.create_primitive(
//!         PrimitiveDesc::triangles(
//!             vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
//!             vec![0, 1, 2],
//!         )
//!         .with_material(material),
//!     )?;
//!     let mesh = engine.create_mesh(vec![triangle])?;
//!     engine.create_mesh_entity(mesh)?;
//!     engine.create_camera_entity()?;
//!
//!     let report = engine.process_frame(&[RenderPass::new(RenderPassUid(0))])?;
//!     println!("{} draws", report.draws);
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod ecs;
pub mod foundation;
pub mod global_data;
pub mod memory;
pub mod render;

mod engine;

pub use engine::{Engine, EngineError, EngineResult, FrameReport};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::Config,
        core::{BufferCapacities, DataTextureConfig, EngineConfig, EngineLimits, StrategyKind},
        ecs::{
            components::{
                CameraComponent, LightComponent, LightType, MeshComponent, MeshRendererComponent,
                SceneGraphComponent, TransformComponent,
            },
            Component, ComponentSid, ComponentTid, EntityUid, ProcessStage,
        },
        foundation::{
            logging,
            math::{Mat3, Mat4, Quat, Vec3, Vec4},
        },
        global_data::{ShaderSemantic, ShaderSemanticsInfo},
        memory::{BufferUse, CompositionType, PropertyValue},
        render::{
            AlphaMode, CgApi, MaterialUid, MeshUid, PrimitiveDesc, PrimitiveUid, RecordingCgApi,
            RenderPass, RenderPassUid, ShaderSource,
        },
        Engine, EngineError, EngineResult, FrameReport,
    };
}
