//! Keyframe animation types.
//!
//! [`AnimationData`] is the raw extraction result: key frames on a merged
//! time axis, each holding one local matrix per sampled joint. [`Animation`]
//! is the playable form, with transforms decomposed into position and
//! rotation so poses can be interpolated between key frames.

use std::collections::HashMap;

use rig_math::{Mat4, Quat, Vec3};
use serde::Serialize;

use crate::collada::ColladaError;

/// Local transform of one joint at one key frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JointTransformData {
    pub joint_name_id: String,
    pub joint_local_transform: Mat4,
}

/// All joint transforms sampled at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeyFrameData {
    /// Seconds from the start of the clip
    pub time: f32,
    pub joint_transforms: Vec<JointTransformData>,
}

/// An extracted clip.
#[derive(Debug, Default, Serialize)]
pub struct AnimationData {
    pub length_seconds: f32,

    /// Key frames in strictly increasing time order
    pub key_frames: Vec<KeyFrameData>,

    /// Channels that were skipped, in the order they were found
    #[serde(skip)]
    pub errors: Vec<ColladaError>,
}

impl AnimationData {
    /// Names of every joint sampled by the clip, in first-seen order.
    pub fn joint_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for transform in self.key_frames.iter().flat_map(|k| &k.joint_transforms) {
            if !names.contains(&transform.joint_name_id.as_str()) {
                names.push(&transform.joint_name_id);
            }
        }
        names
    }
}

/// Position and rotation of a joint relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl JointTransform {
    /// Decompose a local matrix. Scale is discarded.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (_, rotation, position) = matrix.to_scale_rotation_translation();
        Self { position, rotation }
    }

    pub fn local_transform(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// Linear position, spherical rotation blend; `progress` in `0..=1`.
    pub fn interpolate(a: &JointTransform, b: &JointTransform, progress: f32) -> JointTransform {
        JointTransform {
            position: a.position.lerp(b.position, progress),
            rotation: a.rotation.slerp(b.rotation, progress),
        }
    }
}

/// A pose at one point in time.
#[derive(Clone, Debug)]
pub struct KeyFrame {
    pub time: f32,
    pub pose: HashMap<String, JointTransform>,
}

impl From<&KeyFrameData> for KeyFrame {
    fn from(data: &KeyFrameData) -> Self {
        Self {
            time: data.time,
            pose: data
                .joint_transforms
                .iter()
                .map(|t| {
                    (
                        t.joint_name_id.clone(),
                        JointTransform::from_matrix(t.joint_local_transform),
                    )
                })
                .collect(),
        }
    }
}

/// A playable clip.
#[derive(Clone, Debug)]
pub struct Animation {
    pub length: f32,
    pub key_frames: Vec<KeyFrame>,
}

impl From<&AnimationData> for Animation {
    fn from(data: &AnimationData) -> Self {
        Self {
            length: data.length_seconds,
            key_frames: data.key_frames.iter().map(KeyFrame::from).collect(),
        }
    }
}

impl Animation {
    /// Interpolated joint-local matrices at `time`, looping over the clip.
    ///
    /// The result is keyed by joint name and can be handed straight to
    /// [`Skeleton::apply_pose`](crate::skeleton::Skeleton::apply_pose).
    pub fn pose_at(&self, time: f32) -> HashMap<String, Mat4> {
        let (Some(first), Some(last)) = (self.key_frames.first(), self.key_frames.last()) else {
            return HashMap::new();
        };
        let time = if self.length > 0.0 {
            time.rem_euclid(self.length)
        } else {
            0.0
        };

        // Last frame at or before `time`, and the one after it
        let next_index = self
            .key_frames
            .iter()
            .position(|frame| frame.time > time);
        let (previous, next) = match next_index {
            Some(0) => (first, first),
            Some(index) => (&self.key_frames[index - 1], &self.key_frames[index]),
            None => (last, last),
        };

        let span = next.time - previous.time;
        let progress = if span > 0.0 {
            ((time - previous.time) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };

        previous
            .pose
            .iter()
            .map(|(name, from)| {
                let to = next.pose.get(name).unwrap_or(from);
                let blended = JointTransform::interpolate(from, to, progress);
                (name.clone(), blended.local_transform())
            })
            .collect()
    }
}
