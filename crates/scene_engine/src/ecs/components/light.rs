//! Light component
//!
//! A light writes its world position, direction, intensity and properties
//! into the global light arrays at array index = light SID. The light count
//! shaders loop over is written by the light system after every light ran.

use std::f32::consts::FRAC_PI_4;

use crate::ecs::component::{
    member_slot, Component, ComponentBase, ComponentSid, ComponentTid, CreateContext,
};
use crate::ecs::repository::{ComponentRepository, ComponentStore};
use crate::ecs::EcsResult;
use crate::foundation::math::{forward_direction, world_position, Mat4, Vec2, Vec3, Vec4};
use crate::global_data::{GlobalDataRepository, ShaderSemantic};
use crate::memory::{
    BufferUse, CompositionType, ElementSlot, MemberDescriptor, MemoryManager, PropertyValue,
};

const MEMBERS: &[MemberDescriptor] = &[
    MemberDescriptor::new(
        BufferUse::CpuGeneric,
        "color",
        CompositionType::Vec3,
        &[1.0, 1.0, 1.0],
    ),
    MemberDescriptor::new(
        BufferUse::CpuGeneric,
        "intensity",
        CompositionType::Scalar,
        &[1.0],
    ),
    // negative range means unlimited
    MemberDescriptor::new(BufferUse::CpuGeneric, "range", CompositionType::Scalar, &[-1.0]),
    // inner and outer cone angles in radians
    MemberDescriptor::new(
        BufferUse::CpuGeneric,
        "spotAngles",
        CompositionType::Vec2,
        &[0.0, FRAC_PI_4],
    ),
];

/// Light model, written as the first lane of `lightProperty`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightType {
    /// Omnidirectional point light
    #[default]
    Point,
    /// Parallel rays along the node's -Z axis
    Directional,
    /// Cone along the node's -Z axis
    Spot,
    /// Uniform ambient term
    Ambient,
}

impl LightType {
    /// Numeric code used in shaders
    pub const fn code(self) -> f32 {
        match self {
            Self::Point => 0.0,
            Self::Directional => 1.0,
            Self::Spot => 2.0,
            Self::Ambient => 3.0,
        }
    }
}

/// Light source
#[derive(Debug, Clone)]
pub struct LightComponent {
    base: ComponentBase,
    color: ElementSlot,
    intensity: ElementSlot,
    range: ElementSlot,
    spot_angles: ElementSlot,
    light_type: LightType,
    enabled: bool,
    scene_graph_sid: Option<ComponentSid>,
    update_count: u64,
    cached_inputs: Option<(u64, u64)>,
    dropped: bool,
}

impl Component for LightComponent {
    const TID: ComponentTid = ComponentTid::LIGHT;
    const NAME: &'static str = "Light";

    fn members() -> &'static [MemberDescriptor] {
        MEMBERS
    }

    fn from_slots(base: ComponentBase, slots: &[ElementSlot]) -> EcsResult<Self> {
        Ok(Self {
            base,
            color: member_slot::<Self>(slots, 0)?,
            intensity: member_slot::<Self>(slots, 1)?,
            range: member_slot::<Self>(slots, 2)?,
            spot_angles: member_slot::<Self>(slots, 3)?,
            light_type: LightType::Point,
            enabled: true,
            scene_graph_sid: None,
            update_count: 0,
            cached_inputs: None,
            dropped: false,
        })
    }

    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn store(repo: &ComponentRepository) -> &ComponentStore<Self> {
        &repo.lights
    }

    fn store_mut(repo: &mut ComponentRepository) -> &mut ComponentStore<Self> {
        &mut repo.lights
    }

    fn on_create(&mut self, ctx: &mut CreateContext<'_>) -> EcsResult<()> {
        self.scene_graph_sid = ctx.siblings.get(&ComponentTid::SCENE_GRAPH).copied();
        Ok(())
    }

    fn on_destroy(&mut self, memory: &mut MemoryManager, global: &GlobalDataRepository) {
        // a dead slot must not keep lighting the scene
        global.set_value(
            memory,
            &ShaderSemantic::LIGHT_INTENSITY,
            0,
            self.base.component_sid.index(),
            &PropertyValue::Vec3(Vec3::zeros()),
        );
    }
}

impl LightComponent {
    /// Number of property changes
    pub const fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Light model
    pub const fn light_type(&self) -> LightType {
        self.light_type
    }

    /// Change the light model
    pub fn set_light_type(&mut self, light_type: LightType) {
        self.light_type = light_type;
        self.update_count += 1;
    }

    /// Whether the light contributes
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the light
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.update_count += 1;
    }

    /// Color
    pub fn color(&self, memory: &MemoryManager) -> EcsResult<Vec3> {
        Ok(Vec3::from_column_slice(memory.read_slot(self.color)?))
    }

    /// Set the color
    pub fn set_color(&mut self, memory: &mut MemoryManager, color: Vec3) -> EcsResult<()> {
        memory.write_slot(self.color, color.as_slice())?;
        self.update_count += 1;
        Ok(())
    }

    /// Intensity multiplier
    pub fn intensity(&self, memory: &MemoryManager) -> EcsResult<f32> {
        Ok(memory.read_slot(self.intensity)?[0])
    }

    /// Set the intensity multiplier
    pub fn set_intensity(&mut self, memory: &mut MemoryManager, intensity: f32) -> EcsResult<()> {
        memory.write_slot(self.intensity, &[intensity])?;
        self.update_count += 1;
        Ok(())
    }

    /// Range, negative for unlimited
    pub fn range(&self, memory: &MemoryManager) -> EcsResult<f32> {
        Ok(memory.read_slot(self.range)?[0])
    }

    /// Set the range
    pub fn set_range(&mut self, memory: &mut MemoryManager, range: f32) -> EcsResult<()> {
        memory.write_slot(self.range, &[range])?;
        self.update_count += 1;
        Ok(())
    }

    /// Inner and outer spot cone angles in radians
    pub fn spot_angles(&self, memory: &MemoryManager) -> EcsResult<Vec2> {
        Ok(Vec2::from_column_slice(memory.read_slot(self.spot_angles)?))
    }

    /// Set the spot cone angles in radians
    pub fn set_spot_angles(
        &mut self,
        memory: &mut MemoryManager,
        inner: f32,
        outer: f32,
    ) -> EcsResult<()> {
        memory.write_slot(self.spot_angles, &[inner, outer])?;
        self.update_count += 1;
        Ok(())
    }

    /// Scene graph node of the same entity
    pub const fn scene_graph_sid(&self) -> Option<ComponentSid> {
        self.scene_graph_sid
    }

    /// Whether this light has no slot in the global light arrays
    pub const fn is_dropped(&self) -> bool {
        self.dropped
    }

    /// Write this light's entries of the global light arrays if anything moved
    ///
    /// Lights whose sid is past `light_slots` are skipped.
    pub(crate) fn logic(
        &mut self,
        memory: &mut MemoryManager,
        global: &GlobalDataRepository,
        world: &Mat4,
        scene_graph_update_count: u64,
        light_slots: usize,
    ) -> EcsResult<bool> {
        let index = self.base.component_sid.index();
        if index >= light_slots {
            if !self.dropped {
                log::warn!("Light sid {index} ignored, only {light_slots} light slots");
                self.dropped = true;
            }
            return Ok(false);
        }

        let inputs = (self.update_count, scene_graph_update_count);
        if self.cached_inputs == Some(inputs) {
            return Ok(false);
        }

        let intensity = if self.enabled {
            self.color(memory)? * self.intensity(memory)?
        } else {
            Vec3::zeros()
        };
        let angles = self.spot_angles(memory)?;
        let property = Vec4::new(
            self.light_type.code(),
            self.range(memory)?,
            angles.x.cos(),
            angles.y.cos(),
        );

        let writes = [
            (
                ShaderSemantic::LIGHT_POSITION,
                PropertyValue::Vec3(world_position(world)),
            ),
            (
                ShaderSemantic::LIGHT_DIRECTION,
                PropertyValue::Vec3(forward_direction(world)),
            ),
            (ShaderSemantic::LIGHT_INTENSITY, PropertyValue::Vec3(intensity)),
            (ShaderSemantic::LIGHT_PROPERTY, PropertyValue::Vec4(property)),
        ];
        for (semantic, value) in &writes {
            if !global.set_value(memory, semantic, 0, index, value) {
                log::warn!("Light sid {index} could not write {semantic}");
            }
        }

        self.cached_inputs = Some(inputs);
        Ok(true)
    }
}
