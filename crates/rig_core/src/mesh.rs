//! Flat per-mesh vertex data.
//!
//! This module provides the GPU-agnostic mesh record produced by every
//! loader. Buffers are kept as flat, parallel arrays so the render side can
//! upload them directly (see the `*_bytes` accessors).

use rig_math::Vec3;
use serde::Serialize;

/// Joint id of the synthetic "no joint" influence.
///
/// A vertex whose source weights sum to zero is bound entirely to this id
/// with weight 1.0; the skinning shader must treat it as the identity.
pub const NO_JOINT: i32 = -1;

/// Tolerance used when checking that a vertex's weights sum to one.
pub const WEIGHT_EPSILON: f32 = 1e-5;

/// A triangle mesh with optional texture and skinning data.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MeshData {
    /// Geometry name (COLLADA geometry id or OBJ object name)
    pub name: String,

    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Vertex normals, parallel to `positions`
    pub normals: Vec<Vec3>,

    /// UV coordinates (optional - one [u, v] per vertex, top-left origin)
    pub uvs: Option<Vec<[f32; 2]>>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Texture file name as referenced by the document
    pub texture: Option<String>,

    /// Diffuse colour of the bound material, when it has one
    pub diffuse_color: Option<[f32; 4]>,

    /// Width of each vertex's joint/weight group
    pub max_weights: usize,

    /// Joint ids, `max_weights` per vertex
    pub joint_ids: Option<Vec<i32>>,

    /// Joint weights, `max_weights` per vertex
    pub weights: Option<Vec<f32>>,
}

impl MeshData {
    /// Create an unskinned, untextured mesh.
    pub fn new(name: impl Into<String>, positions: Vec<Vec3>, normals: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            positions,
            normals,
            indices,
            ..Default::default()
        }
    }

    /// Attach skinning buffers.
    pub fn set_skin(&mut self, max_weights: usize, joint_ids: Vec<i32>, weights: Vec<f32>) {
        self.max_weights = max_weights;
        self.joint_ids = Some(joint_ids);
        self.weights = Some(weights);
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Get the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn has_uvs(&self) -> bool {
        self.uvs.is_some()
    }

    pub fn is_skinned(&self) -> bool {
        self.joint_ids.is_some() && self.weights.is_some()
    }

    /// Joint ids and weights of one vertex.
    pub fn vertex_influences(&self, vertex: usize) -> Option<(&[i32], &[f32])> {
        let joint_ids = self.joint_ids.as_ref()?;
        let weights = self.weights.as_ref()?;
        let start = vertex * self.max_weights;
        let end = start + self.max_weights;
        Some((joint_ids.get(start..end)?, weights.get(start..end)?))
    }

    /// Compute smooth vertex normals by averaging face normals.
    ///
    /// Faces are assumed counter-clockwise. Vertices not referenced by any
    /// face get +Y.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        for face in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [face[0] as usize, face[1] as usize, face[2] as usize];
            if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
                continue;
            }

            let p0 = self.positions[i0];
            let edge1 = self.positions[i1] - p0;
            let edge2 = self.positions[i2] - p0;
            let face_normal = edge1.cross(edge2);

            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(Vec3::Y);
        }

        self.normals = normals;
    }

    /// Ensure there is one normal per vertex, computing them if necessary.
    pub fn ensure_normals(&mut self) {
        if self.normals.len() != self.positions.len() {
            if !self.normals.is_empty() {
                log::debug!(
                    "Mesh {}: normals array length ({}) doesn't match vertex count ({}), computing smooth normals",
                    self.name,
                    self.normals.len(),
                    self.positions.len()
                );
            }
            self.compute_normals();
        }
    }

    /// Axis-aligned bounds as (min, max), or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p))),
        )
    }

    /// Check the buffer invariants the render side relies on.
    pub fn validate(&self) -> Result<(), String> {
        let vertex_count = self.vertex_count();

        if self.indices.len() % 3 != 0 {
            return Err(format!("index count {} is not a multiple of 3", self.indices.len()));
        }
        if let Some(index) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(format!("index {} out of range for {} vertices", index, vertex_count));
        }
        if self.normals.len() != vertex_count {
            return Err(format!("{} normals for {} vertices", self.normals.len(), vertex_count));
        }
        if let Some(uvs) = &self.uvs {
            if uvs.len() != vertex_count {
                return Err(format!("{} uvs for {} vertices", uvs.len(), vertex_count));
            }
        }

        match (&self.joint_ids, &self.weights) {
            (None, None) => Ok(()),
            (Some(joint_ids), Some(weights)) => {
                let expected = vertex_count * self.max_weights;
                if joint_ids.len() != expected || weights.len() != expected {
                    return Err(format!(
                        "skin buffers have {} joints and {} weights, expected {}",
                        joint_ids.len(),
                        weights.len(),
                        expected
                    ));
                }
                for (vertex, group) in weights.chunks_exact(self.max_weights.max(1)).enumerate() {
                    let sum: f32 = group.iter().sum();
                    if (sum - 1.0).abs() > WEIGHT_EPSILON {
                        return Err(format!("weights of vertex {} sum to {}", vertex, sum));
                    }
                }
                Ok(())
            }
            _ => Err("joint ids and weights must be present together".to_string()),
        }
    }

    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    pub fn uv_bytes(&self) -> Option<&[u8]> {
        self.uvs.as_deref().map(bytemuck::cast_slice)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn joint_id_bytes(&self) -> Option<&[u8]> {
        self.joint_ids.as_deref().map(bytemuck::cast_slice)
    }

    pub fn weight_bytes(&self) -> Option<&[u8]> {
        self.weights.as_deref().map(bytemuck::cast_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshData {
        MeshData::new(
            "tri",
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            Vec::new(),
            vec![0, 1, 2],
        )
    }

    #[test]
    fn test_mesh_creation() {
        let mesh = triangle();

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert!(!mesh.has_uvs());
        assert!(!mesh.is_skinned());
    }

    #[test]
    fn test_compute_normals() {
        // CCW in the XY plane viewed from +Z: normal points +Z
        let mut mesh = triangle();
        mesh.ensure_normals();

        assert_eq!(mesh.normals.len(), 3);
        for normal in &mesh.normals {
            assert!((normal.z - 1.0).abs() < 0.001);
        }
    }

    #[test]
    fn test_unreferenced_vertex_gets_up_normal() {
        let mut mesh = triangle();
        mesh.positions.push(Vec3::new(5.0, 5.0, 5.0));
        mesh.compute_normals();

        assert_eq!(mesh.normals[3], Vec3::Y);
    }

    #[test]
    fn test_bounds() {
        let mesh = MeshData::new(
            "b",
            vec![
                Vec3::new(-1.0, -2.0, -3.0),
                Vec3::new(4.0, 5.0, 6.0),
                Vec3::ZERO,
            ],
            Vec::new(),
            vec![0, 1, 2],
        );
        let (min, max) = mesh.bounds().unwrap();

        assert_eq!(min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(max, Vec3::new(4.0, 5.0, 6.0));
        assert!(MeshData::default().bounds().is_none());
    }

    #[test]
    fn test_validate_index_range() {
        let mut mesh = triangle();
        mesh.ensure_normals();
        assert!(mesh.validate().is_ok());

        mesh.indices = vec![0, 1, 3];
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_validate_skin_weights() {
        let mut mesh = triangle();
        mesh.ensure_normals();
        mesh.set_skin(
            2,
            vec![0, 1, 0, 0, NO_JOINT, 0],
            vec![0.5, 0.5, 1.0, 0.0, 1.0, 0.0],
        );
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.vertex_influences(2), Some((&[NO_JOINT, 0][..], &[1.0, 0.0][..])));

        mesh.weights = Some(vec![0.5, 0.4, 1.0, 0.0, 1.0, 0.0]);
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_byte_views() {
        let mut mesh = triangle();
        mesh.ensure_normals();

        assert_eq!(mesh.position_bytes().len(), 3 * 12);
        assert_eq!(mesh.index_bytes().len(), 3 * 4);
        assert!(mesh.uv_bytes().is_none());
        assert!(mesh.joint_id_bytes().is_none());
    }
}
