//! Meshes and primitives
//!
//! Vertex attributes and morph targets live in the GPU vertex data buffer
//! behind accessors. A strategy compares [`Primitive::position_accessor_version`]
//! with the version it last uploaded to decide whether vertex buffers must be
//! rebuilt.

use crate::foundation::math::{Aabb, Vec3};
use crate::memory::{
    AccessorDesc, AccessorHandle, BufferUse, BufferViewDesc, CompositionType, MemoryManager,
};

use super::material::MaterialUid;
use super::{RenderError, RenderResult};

/// Mesh identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshUid(pub u32);

/// Primitive identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveUid(pub u32);

/// Topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveMode {
    /// Point list
    Points,
    /// Line list
    Lines,
    /// Triangle list
    #[default]
    Triangles,
    /// Triangle strip
    TriangleStrip,
}

/// Input for [`MeshRepository::create_primitive`]
#[derive(Debug, Clone, Default)]
pub struct PrimitiveDesc {
    /// xyz per vertex
    pub positions: Vec<f32>,
    /// xyz per vertex, same count as positions
    pub normals: Option<Vec<f32>>,
    /// Triangle (or line/point) indices
    pub indices: Option<Vec<u32>>,
    /// Topology
    pub mode: PrimitiveMode,
    /// Material drawn with
    pub material: Option<MaterialUid>,
    /// Position deltas per morph target
    pub morph_targets: Vec<Vec<f32>>,
}

impl PrimitiveDesc {
    /// Triangle list from positions and indices
    pub fn triangles(positions: Vec<f32>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices: Some(indices),
            ..Self::default()
        }
    }

    /// Set the material
    pub const fn with_material(mut self, material: MaterialUid) -> Self {
        self.material = Some(material);
        self
    }

    /// Set normals
    pub fn with_normals(mut self, normals: Vec<f32>) -> Self {
        self.normals = Some(normals);
        self
    }

    /// Add a morph target
    pub fn with_morph_target(mut self, deltas: Vec<f32>) -> Self {
        self.morph_targets.push(deltas);
        self
    }
}

/// Drawable piece of a mesh
#[derive(Debug, Clone)]
pub struct Primitive {
    uid: PrimitiveUid,
    mode: PrimitiveMode,
    material: Option<MaterialUid>,
    indices: Option<Vec<u32>>,
    vertex_count: usize,
    position: AccessorHandle,
    normal: Option<AccessorHandle>,
    morph_targets: Vec<AccessorHandle>,
    aabb: Aabb,
    sort_priority: u16,
}

impl Primitive {
    /// Identifier
    pub const fn uid(&self) -> PrimitiveUid {
        self.uid
    }

    /// Topology
    pub const fn mode(&self) -> PrimitiveMode {
        self.mode
    }

    /// Material drawn with
    pub const fn material(&self) -> Option<MaterialUid> {
        self.material
    }

    /// Index data, if indexed
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    /// Vertices
    pub const fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Elements a draw covers
    pub fn element_count(&self) -> usize {
        self.indices.as_ref().map_or(self.vertex_count, Vec::len)
    }

    /// Position accessor
    pub const fn position_accessor(&self) -> AccessorHandle {
        self.position
    }

    /// Normal accessor
    pub const fn normal_accessor(&self) -> Option<AccessorHandle> {
        self.normal
    }

    /// Morph target accessors
    pub fn morph_targets(&self) -> &[AccessorHandle] {
        &self.morph_targets
    }

    /// Object-space bounds
    pub const fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Write counter of the position accessor
    pub fn position_accessor_version(&self, memory: &MemoryManager) -> RenderResult<u64> {
        Ok(memory.accessor(self.position)?.version())
    }

    /// Positions as xyz floats
    pub fn positions(&self, memory: &MemoryManager) -> RenderResult<Vec<f32>> {
        Ok(memory.read_elements(self.position, self.vertex_count)?)
    }

    /// Normals as xyz floats
    pub fn normals(&self, memory: &MemoryManager) -> RenderResult<Option<Vec<f32>>> {
        match self.normal {
            Some(normal) => Ok(Some(memory.read_elements(normal, self.vertex_count)?)),
            None => Ok(None),
        }
    }

    /// Overwrite positions (same vertex count)
    pub fn set_positions(
        &mut self,
        memory: &mut MemoryManager,
        positions: &[f32],
    ) -> RenderResult<()> {
        if positions.len() != self.vertex_count * 3 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "primitive {:?} has {} vertices, got {} floats",
                self.uid,
                self.vertex_count,
                positions.len()
            )));
        }
        memory.write_elements(self.position, positions)?;
        if let Some(aabb) = Aabb::from_positions(positions) {
            self.aabb = aabb;
        }
        Ok(())
    }

    /// Composite sort key: explicit priority, then material
    pub fn sort_key(&self) -> u32 {
        (u32::from(self.sort_priority) << 16) | self.material.map_or(0, |m| m.0 & 0xffff)
    }

    /// Draw earlier (lower) or later (higher) than other primitives
    pub fn set_sort_priority(&mut self, priority: u16) {
        self.sort_priority = priority;
    }
}

/// Group of primitives drawn together
#[derive(Debug, Clone)]
pub struct Mesh {
    uid: MeshUid,
    primitives: Vec<PrimitiveUid>,
    morph_weights: Vec<f32>,
}

impl Mesh {
    /// Identifier
    pub const fn uid(&self) -> MeshUid {
        self.uid
    }

    /// Primitives in draw order
    pub fn primitives(&self) -> &[PrimitiveUid] {
        &self.primitives
    }

    /// Morph target weights
    pub fn morph_weights(&self) -> &[f32] {
        &self.morph_weights
    }

    /// Set morph target weights
    pub fn set_morph_weights(&mut self, weights: Vec<f32>) {
        self.morph_weights = weights;
    }
}

/// All meshes and primitives
#[derive(Debug, Clone, Default)]
pub struct MeshRepository {
    meshes: Vec<Mesh>,
    primitives: Vec<Primitive>,
}

impl MeshRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload primitive data into vertex memory
    pub fn create_primitive(
        &mut self,
        memory: &mut MemoryManager,
        desc: PrimitiveDesc,
    ) -> RenderResult<PrimitiveUid> {
        let vertex_count = desc.positions.len() / 3;
        if vertex_count == 0 || desc.positions.len() % 3 != 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "primitive needs xyz positions, got {} floats",
                desc.positions.len()
            )));
        }
        if let Some(indices) = &desc.indices {
            if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(RenderError::ResourceCreationFailed(format!(
                    "index {bad} out of range for {vertex_count} vertices"
                )));
            }
        }

        let position = vec3_accessor(memory, &desc.positions)?;
        let normal = match &desc.normals {
            Some(normals) if normals.len() == desc.positions.len() => {
                Some(vec3_accessor(memory, normals)?)
            }
            Some(_) => {
                log::warn!("Ignoring normals whose count differs from positions");
                None
            }
            None => None,
        };
        let mut morph_targets = Vec::with_capacity(desc.morph_targets.len());
        for deltas in &desc.morph_targets {
            if deltas.len() == desc.positions.len() {
                morph_targets.push(vec3_accessor(memory, deltas)?);
            } else {
                log::warn!("Ignoring morph target whose count differs from positions");
            }
        }

        let uid = PrimitiveUid(self.primitives.len() as u32);
        let aabb = Aabb::from_positions(&desc.positions)
            .unwrap_or_else(|| Aabb::new(Vec3::zeros(), Vec3::zeros()));
        self.primitives.push(Primitive {
            uid,
            mode: desc.mode,
            material: desc.material,
            indices: desc.indices,
            vertex_count,
            position,
            normal,
            morph_targets,
            aabb,
            sort_priority: 0,
        });
        log::debug!("Created primitive {} with {} vertices", uid.0, vertex_count);
        Ok(uid)
    }

    /// Group primitives into a mesh
    pub fn create_mesh(&mut self, primitives: Vec<PrimitiveUid>) -> RenderResult<MeshUid> {
        if let Some(&missing) = primitives
            .iter()
            .find(|uid| uid.0 as usize >= self.primitives.len())
        {
            return Err(RenderError::MissingPrimitive(missing));
        }
        let uid = MeshUid(self.meshes.len() as u32);
        self.meshes.push(Mesh {
            uid,
            primitives,
            morph_weights: Vec::new(),
        });
        Ok(uid)
    }

    /// Mesh by UID
    pub fn mesh(&self, uid: MeshUid) -> Option<&Mesh> {
        self.meshes.get(uid.0 as usize)
    }

    /// Mesh by UID, mutable
    pub fn mesh_mut(&mut self, uid: MeshUid) -> Option<&mut Mesh> {
        self.meshes.get_mut(uid.0 as usize)
    }

    /// Primitive by UID
    pub fn primitive(&self, uid: PrimitiveUid) -> Option<&Primitive> {
        self.primitives.get(uid.0 as usize)
    }

    /// Primitive by UID, mutable
    pub fn primitive_mut(&mut self, uid: PrimitiveUid) -> Option<&mut Primitive> {
        self.primitives.get_mut(uid.0 as usize)
    }

    /// Every primitive
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// Object-space bounds of a whole mesh
    pub fn mesh_aabb(&self, uid: MeshUid) -> Option<Aabb> {
        self.mesh(uid)?
            .primitives
            .iter()
            .filter_map(|p| self.primitive(*p))
            .map(|p| *p.aabb())
            .reduce(|a, b| a.merged(&b))
    }
}

fn vec3_accessor(memory: &mut MemoryManager, floats: &[f32]) -> RenderResult<AccessorHandle> {
    let count = floats.len() / 3;
    let view = memory.take_buffer_view(
        BufferUse::GpuVertexData,
        BufferViewDesc::new(count * 12).with_align(BufferUse::GpuVertexData.min_alignment()),
    )?;
    let accessor = memory.take_accessor(view, AccessorDesc::new(CompositionType::Vec3, count))?;
    memory.write_elements(accessor, floats)?;
    Ok(accessor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BufferCapacities;

    fn triangle() -> PrimitiveDesc {
        PrimitiveDesc::triangles(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn test_primitive_round_trip_and_version() {
        let mut memory = MemoryManager::new(&BufferCapacities::default());
        let mut meshes = MeshRepository::new();
        let uid = meshes.create_primitive(&mut memory, triangle()).unwrap();

        let primitive = meshes.primitive(uid).unwrap();
        assert_eq!(primitive.vertex_count(), 3);
        assert_eq!(primitive.element_count(), 3);
        assert_eq!(primitive.positions(&memory).unwrap()[3], 1.0);
        let before = primitive.position_accessor_version(&memory).unwrap();

        meshes
            .primitive_mut(uid)
            .unwrap()
            .set_positions(&mut memory, &[0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0])
            .unwrap();
        let primitive = meshes.primitive(uid).unwrap();
        assert!(primitive.position_accessor_version(&memory).unwrap() > before);
        assert_eq!(primitive.aabb().max.x, 2.0);
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let mut memory = MemoryManager::new(&BufferCapacities::default());
        let mut meshes = MeshRepository::new();
        let desc = PrimitiveDesc::triangles(vec![0.0; 9], vec![0, 1, 3]);
        assert!(meshes.create_primitive(&mut memory, desc).is_err());
    }

    #[test]
    fn test_mesh_requires_existing_primitives() {
        let mut meshes = MeshRepository::new();
        assert_eq!(
            meshes.create_mesh(vec![PrimitiveUid(0)]).unwrap_err(),
            RenderError::MissingPrimitive(PrimitiveUid(0))
        );
    }
}
