//! Camera component
//!
//! Parameters and matrices live in CPU memory; the view matrix, projection
//! matrix and view position are mirrored into global data at count index
//! equal to the camera SID so shaders can select a camera by SID.
//!
//! Logic recomputes only when the camera's own update count, the transform
//! generation or its scene graph update count moved since the last run.

use crate::ecs::component::{
    member_slot, Component, ComponentBase, ComponentSid, ComponentTid, CreateContext,
};
use crate::ecs::repository::{ComponentRepository, ComponentStore};
use crate::ecs::EcsResult;
use crate::foundation::math::{world_position, Frustum, Mat4, Vec3, Vec4};
use crate::global_data::{GlobalValue, ShaderSemantic};
use crate::memory::{
    BufferUse, CompositionType, ElementSlot, MemberDescriptor, MemoryManager, PropertyValue,
};

const IDENTITY_MAT4: &[f32] = &[
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

const MEMBERS: &[MemberDescriptor] = &[
    // perspective: (near, far, fovy degrees, aspect)
    // orthographic: (near, far, xmag, ymag)
    MemberDescriptor::new(
        BufferUse::CpuGeneric,
        "parameters",
        CompositionType::Vec4,
        &[0.1, 1000.0, 45.0, 1.0],
    ),
    MemberDescriptor::new(
        BufferUse::CpuGeneric,
        "projectionMatrix",
        CompositionType::Mat4,
        IDENTITY_MAT4,
    ),
    MemberDescriptor::new(
        BufferUse::CpuGeneric,
        "viewMatrix",
        CompositionType::Mat4,
        IDENTITY_MAT4,
    ),
];

/// Projection model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraType {
    /// Perspective projection
    #[default]
    Perspective,
    /// Orthographic projection
    Orthographic,
}

/// Inputs camera logic compares against its cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraLogicInputs {
    /// Camera's own update count
    pub own_update_count: u64,
    /// Repository-wide transform generation
    pub transform_generation: u64,
    /// Update count of the camera's scene graph node
    pub scene_graph_update_count: u64,
}

#[derive(Debug, Clone)]
struct CameraGlobals {
    view: GlobalValue,
    projection: GlobalValue,
    position: GlobalValue,
}

/// Camera
#[derive(Debug, Clone)]
pub struct CameraComponent {
    base: ComponentBase,
    parameters: ElementSlot,
    projection_matrix: ElementSlot,
    view_matrix: ElementSlot,
    camera_type: CameraType,
    scene_graph_sid: Option<ComponentSid>,
    transform_sid: Option<ComponentSid>,
    globals: Option<CameraGlobals>,
    update_count: u64,
    cached_inputs: Option<CameraLogicInputs>,
    recompute_count: u64,
}

impl Component for CameraComponent {
    const TID: ComponentTid = ComponentTid::CAMERA;
    const NAME: &'static str = "Camera";

    fn members() -> &'static [MemberDescriptor] {
        MEMBERS
    }

    fn from_slots(base: ComponentBase, slots: &[ElementSlot]) -> EcsResult<Self> {
        Ok(Self {
            base,
            parameters: member_slot::<Self>(slots, 0)?,
            projection_matrix: member_slot::<Self>(slots, 1)?,
            view_matrix: member_slot::<Self>(slots, 2)?,
            camera_type: CameraType::Perspective,
            scene_graph_sid: None,
            transform_sid: None,
            globals: None,
            update_count: 0,
            cached_inputs: None,
            recompute_count: 0,
        })
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn store(repo: &ComponentRepository) -> &ComponentStore<Self> {
        &repo.cameras
    }

    fn store_mut(repo: &mut ComponentRepository) -> &mut ComponentStore<Self> {
        &mut repo.cameras
    }

    fn on_create(&mut self, ctx: &mut CreateContext<'_>) -> EcsResult<()> {
        self.scene_graph_sid = ctx.siblings.get(&ComponentTid::SCENE_GRAPH).copied();
        self.transform_sid = ctx.siblings.get(&ComponentTid::TRANSFORM).copied();

        let sid = self.base.component_sid.index();
        let mut lease = |semantic: &ShaderSemantic| {
            // a reused SID already owns its count slot
            ctx.global
                .leased_value(semantic, sid, 0)
                .or_else(|| ctx.global.take_one(ctx.memory, semantic, 0))
        };
        let view = lease(&ShaderSemantic::VIEW_MATRIX);
        let projection = lease(&ShaderSemantic::PROJECTION_MATRIX);
        let position = lease(&ShaderSemantic::VIEW_POSITION);

        match (view, projection, position) {
            (Some(view), Some(projection), Some(position)) => {
                if view.count_index != sid {
                    log::warn!(
                        "Camera sid {} got global slot {}; shaders index cameras by sid",
                        sid,
                        view.count_index
                    );
                }
                self.globals = Some(CameraGlobals {
                    view,
                    projection,
                    position,
                });
            }
            _ => log::warn!(
                "Camera sid {sid} has no global matrix slots and is invisible to shaders"
            ),
        }
        Ok(())
    }
}

impl CameraComponent {
    /// Number of parameter changes
    pub const fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Number of times Logic actually recomputed the matrices
    pub const fn recompute_count(&self) -> u64 {
        self.recompute_count
    }

    /// Projection model
    pub const fn camera_type(&self) -> CameraType {
        self.camera_type
    }

    /// Scene graph node of the same entity
    pub const fn scene_graph_sid(&self) -> Option<ComponentSid> {
        self.scene_graph_sid
    }

    /// Transform of the same entity
    pub const fn transform_sid(&self) -> Option<ComponentSid> {
        self.transform_sid
    }

    /// Raw parameters
    pub fn parameters(&self, memory: &MemoryManager) -> EcsResult<Vec4> {
        Ok(Vec4::from_column_slice(memory.read_slot(self.parameters)?))
    }

    /// Use a perspective projection (`fovy` in degrees)
    pub fn set_perspective(
        &mut self,
        memory: &mut MemoryManager,
        fovy_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> EcsResult<()> {
        memory.write_slot(self.parameters, &[near, far, fovy_degrees, aspect])?;
        self.camera_type = CameraType::Perspective;
        self.update_count += 1;
        Ok(())
    }

    /// Use an orthographic projection (`xmag`/`ymag` are half extents)
    pub fn set_orthographic(
        &mut self,
        memory: &mut MemoryManager,
        xmag: f32,
        ymag: f32,
        near: f32,
        far: f32,
    ) -> EcsResult<()> {
        memory.write_slot(self.parameters, &[near, far, xmag, ymag])?;
        self.camera_type = CameraType::Orthographic;
        self.update_count += 1;
        Ok(())
    }

    /// Change only the aspect ratio (perspective) or `ymag` (orthographic)
    pub fn set_aspect(&mut self, memory: &mut MemoryManager, aspect: f32) -> EcsResult<()> {
        let mut parameters = self.parameters(memory)?;
        parameters.w = aspect;
        memory.write_slot(self.parameters, parameters.as_slice())?;
        self.update_count += 1;
        Ok(())
    }

    /// Projection matrix as of the last Logic
    pub fn projection_matrix(&self, memory: &MemoryManager) -> EcsResult<Mat4> {
        Ok(Mat4::from_column_slice(memory.read_slot(self.projection_matrix)?))
    }

    /// View matrix as of the last Logic
    pub fn view_matrix(&self, memory: &MemoryManager) -> EcsResult<Mat4> {
        Ok(Mat4::from_column_slice(memory.read_slot(self.view_matrix)?))
    }

    /// Camera position in world space
    pub fn world_position(&self, memory: &MemoryManager) -> EcsResult<Vec3> {
        let view = self.view_matrix(memory)?;
        Ok(view
            .try_inverse()
            .map_or_else(Vec3::zeros, |world| world_position(&world)))
    }

    /// Frustum as of the last Logic
    pub fn frustum(&self, memory: &MemoryManager) -> EcsResult<Frustum> {
        let view_projection = self.projection_matrix(memory)? * self.view_matrix(memory)?;
        Ok(Frustum::from_view_projection(&view_projection))
    }

    fn compute_projection(&self, parameters: &Vec4) -> Mat4 {
        let (near, far) = (parameters.x, parameters.y);
        match self.camera_type {
            CameraType::Perspective => Mat4::new_perspective(
                parameters.w.max(f32::EPSILON),
                parameters.z.to_radians(),
                near,
                far,
            ),
            CameraType::Orthographic => Mat4::new_orthographic(
                -parameters.z,
                parameters.z,
                -parameters.w,
                parameters.w,
                near,
                far,
            ),
        }
    }

    /// Recompute matrices if any input moved; returns whether it did
    pub(crate) fn logic(
        &mut self,
        memory: &mut MemoryManager,
        inputs: CameraLogicInputs,
        world: &Mat4,
    ) -> EcsResult<bool> {
        if self.cached_inputs == Some(inputs) {
            return Ok(false);
        }

        let parameters = self.parameters(memory)?;
        let projection = self.compute_projection(&parameters);
        let view = world.try_inverse().unwrap_or_else(Mat4::identity);
        memory.write_slot(self.projection_matrix, projection.as_slice())?;
        memory.write_slot(self.view_matrix, view.as_slice())?;

        if let Some(globals) = &self.globals {
            globals.view.write(memory, &PropertyValue::Mat4(view))?;
            globals
                .projection
                .write(memory, &PropertyValue::Mat4(projection))?;
            globals
                .position
                .write(memory, &PropertyValue::Vec3(world_position(world)))?;
        }

        self.cached_inputs = Some(inputs);
        self.recompute_count += 1;
        Ok(true)
    }

    /// Global count index the camera's matrices live at
    pub fn global_index(&self) -> Option<usize> {
        self.globals.as_ref().map(|g| g.view.count_index)
    }
}
