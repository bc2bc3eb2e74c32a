//! Built-in component types
//!
//! Each component registers its numeric members into the shared buffers when
//! allocated and reads/writes them through slots afterwards.

pub mod camera;
pub mod light;
pub mod mesh;
pub mod mesh_renderer;
pub mod scene_graph;
pub mod transform;

pub use camera::{CameraComponent, CameraLogicInputs, CameraType};
pub use light::{LightComponent, LightType};
pub use mesh::MeshComponent;
pub use mesh_renderer::MeshRendererComponent;
pub use scene_graph::SceneGraphComponent;
pub use transform::TransformComponent;
