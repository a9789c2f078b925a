//! The assembled result of a model load.

use rig_math::Vec3;
use serde::Serialize;

use crate::collada::ColladaError;
use crate::mesh::MeshData;
use crate::skeleton::{Skeleton, SkeletonData};

/// Meshes and skeleton of one document, plus everything that went wrong
/// without aborting the load.
#[derive(Debug, Default, Serialize)]
pub struct AnimatedModelData {
    pub meshes: Vec<MeshData>,

    /// Present when the document has skins bound to scene joints
    pub skeleton: Option<SkeletonData>,

    /// Non-fatal errors, in the order they were found
    #[serde(skip)]
    pub errors: Vec<ColladaError>,
}

impl AnimatedModelData {
    /// Build the playable joint hierarchy, if the model has a skeleton.
    pub fn skeleton(&self) -> Option<Skeleton> {
        self.skeleton.as_ref().map(SkeletonData::build)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Get mesh count.
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Get total triangle count across all meshes.
    pub fn total_triangle_count(&self) -> usize {
        self.meshes.iter().map(MeshData::triangle_count).sum()
    }

    /// Get total vertex count across all meshes.
    pub fn total_vertex_count(&self) -> usize {
        self.meshes.iter().map(MeshData::vertex_count).sum()
    }

    pub fn joint_count(&self) -> usize {
        self.skeleton.as_ref().map_or(0, |skeleton| skeleton.joint_count)
    }

    /// Find a mesh by name.
    pub fn mesh(&self, name: &str) -> Option<&MeshData> {
        self.meshes.iter().find(|mesh| mesh.name == name)
    }

    /// Bounds of all meshes as (min, max), or `None` when there are none.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.meshes
            .iter()
            .filter_map(MeshData::bounds)
            .reduce(|(min_a, max_a), (min_b, max_b)| (min_a.min(min_b), max_a.max(max_b)))
    }
}
