//! Joint hierarchy types.
//!
//! [`JointData`] is what the skeleton extractor produces: a plain tree of
//! bind-pose transforms. [`Joint`] is the playable form built from it, which
//! additionally tracks the animated transform of the current pose.

use std::collections::HashMap;

use rig_math::Mat4;
use serde::Serialize;

/// One joint as extracted from the document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JointData {
    /// Pre-order index, `0..joint_count`
    pub index: usize,

    /// Name used to match skin bindings and animation channels
    pub name: String,

    /// Bind transform relative to the parent joint
    pub bind_local_transform: Mat4,

    /// Model space to joint space at bind time
    pub inverse_bind_transform: Mat4,

    pub children: Vec<JointData>,
}

impl JointData {
    pub fn new(index: usize, name: impl Into<String>, bind_local_transform: Mat4, inverse_bind_transform: Mat4) -> Self {
        Self {
            index,
            name: name.into(),
            bind_local_transform,
            inverse_bind_transform,
            children: Vec::new(),
        }
    }

    /// Visit this joint and all descendants in pre-order.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a JointData)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

/// Extracted skeleton: the root joint plus the number of joints under it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkeletonData {
    pub root: JointData,
    pub joint_count: usize,
}

impl SkeletonData {
    /// Joint name to index, for every joint in the tree.
    pub fn joint_indices(&self) -> HashMap<String, usize> {
        let mut indices = HashMap::with_capacity(self.joint_count);
        self.root.visit(&mut |joint| {
            indices.insert(joint.name.clone(), joint.index);
        });
        indices
    }

    /// Build the playable joint hierarchy.
    pub fn build(&self) -> Skeleton {
        Skeleton {
            root: Joint::from_data(&self.root),
            joint_count: self.joint_count,
        }
    }
}

/// A joint of a playable skeleton.
#[derive(Clone, Debug)]
pub struct Joint {
    pub index: usize,
    pub name: String,
    pub local_bind_transform: Mat4,
    pub inverse_bind_transform: Mat4,
    pub children: Vec<Joint>,

    /// Model-space transform of the current pose times the inverse bind
    /// transform; identity while the skeleton is in its bind pose.
    animated_transform: Mat4,
}

impl Joint {
    /// Recursively build a joint and all of its descendants.
    pub fn from_data(data: &JointData) -> Self {
        Self {
            index: data.index,
            name: data.name.clone(),
            local_bind_transform: data.bind_local_transform,
            inverse_bind_transform: data.inverse_bind_transform,
            children: data.children.iter().map(Joint::from_data).collect(),
            animated_transform: Mat4::IDENTITY,
        }
    }

    pub fn animated_transform(&self) -> Mat4 {
        self.animated_transform
    }

    fn apply_pose(&mut self, pose: &HashMap<String, Mat4>, parent_transform: Mat4, matched: &mut usize) {
        let local = match pose.get(&self.name) {
            Some(local) => {
                *matched += 1;
                *local
            }
            None => self.local_bind_transform,
        };
        let current = parent_transform * local;
        for child in &mut self.children {
            child.apply_pose(pose, current, matched);
        }
        self.animated_transform = current * self.inverse_bind_transform;
    }

    fn collect_matrices(&self, matrices: &mut [Mat4]) {
        if let Some(slot) = matrices.get_mut(self.index) {
            *slot = self.animated_transform;
        }
        for child in &self.children {
            child.collect_matrices(matrices);
        }
    }
}

/// A playable skeleton.
#[derive(Clone, Debug)]
pub struct Skeleton {
    pub root: Joint,
    pub joint_count: usize,
}

impl Skeleton {
    /// Pose the skeleton from joint-local matrices keyed by joint name.
    ///
    /// Joints missing from `pose` keep their bind transform, and pose
    /// entries naming joints this skeleton does not have are ignored.
    pub fn apply_pose(&mut self, pose: &HashMap<String, Mat4>) {
        let mut matched = 0;
        self.root.apply_pose(pose, Mat4::IDENTITY, &mut matched);
        if matched < pose.len() {
            log::debug!(
                "{} of {} posed joints not found in skeleton",
                pose.len() - matched,
                pose.len()
            );
        }
    }

    /// Skinning matrices indexed by joint index.
    pub fn joint_matrices(&self) -> Vec<Mat4> {
        let mut matrices = vec![Mat4::IDENTITY; self.joint_count];
        self.root.collect_matrices(&mut matrices);
        matrices
    }
}
