//! Keyframe extraction from `<library_animations>`.

use std::collections::HashSet;

use rig_math::{Mat4, Mat4Ext};

use super::skeleton::{joint_node_name, root_candidates, skin_joint_name};
use super::source::{find_source, read_float_source, read_inputs, strip_hash, Input};
use super::ColladaError;
use crate::animation::{AnimationData, JointTransformData, KeyFrameData};
use crate::xml::XmlNode;

/// Sample times closer than this are merged into one key frame.
const TIME_EPSILON: f32 = 1e-6;

/// Samples of one joint, in channel order.
#[derive(Debug)]
struct Track {
    joint: String,
    times: Vec<f32>,
    transforms: Vec<Mat4>,
}

impl Track {
    /// Latest sample at or before `time`, or the first sample when `time`
    /// precedes all of them.
    fn sample(&self, time: f32, cursor: &mut usize) -> Mat4 {
        while *cursor + 1 < self.times.len() && self.times[*cursor + 1] <= time + TIME_EPSILON {
            *cursor += 1;
        }
        self.transforms[*cursor]
    }
}

/// Reads matrix channels and merges them onto one time axis.
pub struct AnimationExtractor<'a> {
    animations: Option<&'a XmlNode>,
    visual_scenes: Option<&'a XmlNode>,
    skin_joints: HashSet<&'a str>,
    correction: Mat4,
}

impl<'a> AnimationExtractor<'a> {
    /// `correction` is the up-axis rotation applied to the root joint's
    /// samples.
    pub fn new(
        library_animations: Option<&'a XmlNode>,
        library_visual_scenes: Option<&'a XmlNode>,
        correction: Mat4,
    ) -> Self {
        Self {
            animations: library_animations,
            visual_scenes: library_visual_scenes,
            skin_joints: HashSet::new(),
            correction,
        }
    }

    /// Joint names the document's skins bind to. The root joint is then
    /// the first node bound by one of them, as in the skeleton.
    pub fn with_skin_joints(mut self, joint_names: impl IntoIterator<Item = &'a str>) -> Self {
        self.skin_joints = joint_names.into_iter().collect();
        self
    }

    pub fn extract(&self) -> AnimationData {
        let mut data = AnimationData::default();
        let Some(library) = self.animations else {
            return data;
        };

        let mut tracks: Vec<Track> = Vec::new();
        let mut leaves = Vec::new();
        collect_leaves(library, &mut leaves);
        for animation in leaves {
            for channel in animation.children("channel") {
                let target = channel.attribute("target").unwrap_or("");
                match self.read_channel(animation, channel) {
                    Ok(Some(track)) => {
                        if tracks.iter().any(|t| t.joint == track.joint) {
                            log::debug!("Joint {} already animated, ignoring {}", track.joint, target);
                        } else {
                            tracks.push(track);
                        }
                    }
                    Ok(None) => {}
                    Err(message) => {
                        let error = ColladaError::invalid(target, message);
                        log::warn!("{}", error);
                        data.errors.push(error);
                    }
                }
            }
        }

        if let Some(root) = self.root_joint_name() {
            if let Some(track) = tracks.iter_mut().find(|t| t.joint == root) {
                for transform in &mut track.transforms {
                    *transform = self.correction * *transform;
                }
            }
        }

        let mut times: Vec<f32> = tracks.iter().flat_map(|t| t.times.iter().copied()).collect();
        times.sort_by(f32::total_cmp);
        times.dedup_by(|a, b| (*a - *b).abs() <= TIME_EPSILON);

        data.length_seconds = times.last().copied().unwrap_or(0.0);

        let mut cursors = vec![0usize; tracks.len()];
        data.key_frames = times
            .into_iter()
            .map(|time| KeyFrameData {
                time,
                joint_transforms: tracks
                    .iter()
                    .zip(cursors.iter_mut())
                    .map(|(track, cursor)| JointTransformData {
                        joint_name_id: track.joint.clone(),
                        joint_local_transform: track.sample(time, cursor),
                    })
                    .collect(),
            })
            .collect();

        log::debug!(
            "Animation: {} joints, {} key frames, {:.3}s",
            tracks.len(),
            data.key_frames.len(),
            data.length_seconds
        );
        data
    }

    /// Read one channel. `Ok(None)` means the channel animates something
    /// other than a whole node matrix.
    fn read_channel(&self, animation: &XmlNode, channel: &XmlNode) -> Result<Option<Track>, String> {
        let target = channel.attribute("target").ok_or("channel has no target")?;
        let (node_id, property) = target.split_once('/').unwrap_or((target, ""));
        if property != "transform" && property != "matrix" {
            log::debug!("Skipping channel {}: only matrix channels are supported", target);
            return Ok(None);
        }

        let sampler_id = strip_hash(channel.attribute("source").unwrap_or(""));
        let sampler = animation
            .child_with_attribute("sampler", "id", sampler_id)
            .ok_or_else(|| format!("sampler {} not found", sampler_id))?;
        let inputs = read_inputs(sampler)?;

        let times = read_float_source(sampler_source(animation, &inputs, "INPUT")?)?.data;
        let values = read_float_source(sampler_source(animation, &inputs, "OUTPUT")?)?.data;
        if values.len() % 16 != 0 {
            return Err(format!("output holds {} floats, not whole matrices", values.len()));
        }
        if values.len() / 16 != times.len() {
            return Err(format!(
                "{} sample times but {} matrices",
                times.len(),
                values.len() / 16
            ));
        }
        if times.is_empty() {
            return Err("channel has no samples".to_string());
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err("non-finite sample time".to_string());
        }
        if times.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err("sample times are not sorted".to_string());
        }

        let transforms = values
            .chunks_exact(16)
            .filter_map(Mat4::from_row_major)
            .collect();

        Ok(Some(Track {
            joint: self.joint_name(node_id),
            times,
            transforms,
        }))
    }

    /// Joint name of a targeted node, as the skeleton names it. Targets
    /// outside the visual scenes are kept verbatim.
    fn joint_name(&self, node_id: &str) -> String {
        self.visual_scenes
            .and_then(|scenes| {
                scenes
                    .descendants()
                    .find(|node| node.name() == "node" && node.attribute("id") == Some(node_id))
            })
            .and_then(joint_node_name)
            .unwrap_or(node_id)
            .to_string()
    }

    /// The skeleton root: the first candidate node bound by a skin joint
    /// name, or without skins the first `type="JOINT"` candidate.
    fn root_joint_name(&self) -> Option<&'a str> {
        let mut candidates = root_candidates(self.visual_scenes?);
        let root = if self.skin_joints.is_empty() {
            candidates.find(|node| node.attribute("type") == Some("JOINT"))
        } else {
            candidates.find(|node| skin_joint_name(node, &self.skin_joints).is_some())
        }?;
        joint_node_name(root)
    }
}

fn sampler_source<'n>(animation: &'n XmlNode, inputs: &[Input<'_>], semantic: &str) -> Result<&'n XmlNode, String> {
    let input = inputs
        .iter()
        .find(|input| input.semantic == semantic)
        .ok_or_else(|| format!("sampler has no {} input", semantic))?;
    find_source(animation, input.source).ok_or_else(|| format!("source {} not found", input.source))
}

/// `<animation>` elements that own channels, in document order.
fn collect_leaves<'a>(parent: &'a XmlNode, out: &mut Vec<&'a XmlNode>) {
    for animation in parent.children("animation") {
        if animation.child("channel").is_some() {
            out.push(animation);
        }
        collect_leaves(animation, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_bytes;
    use rig_math::Vec3;

    const SCENES: &str = r#"<library_visual_scenes>
  <visual_scene id="Scene">
    <node id="Armature">
      <node id="Armature_hip" sid="hip" name="hip" type="JOINT">
        <node id="Armature_knee" sid="knee" name="knee" type="JOINT"/>
      </node>
    </node>
  </visual_scene>
</library_visual_scenes>"#;

    /// Row-major translation matrices, one per x offset.
    fn matrices(xs: &[f32]) -> String {
        xs.iter()
            .map(|x| format!("1 0 0 {} 0 1 0 0 0 0 1 0 0 0 0 1", x))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn channel(node: &str, times: &[f32], xs: &[f32]) -> String {
        let time_text = times.iter().map(f32::to_string).collect::<Vec<_>>().join(" ");
        format!(
            r##"<animation id="{node}-anim">
  <source id="{node}-input">
    <float_array id="{node}-input-array" count="{n}">{time_text}</float_array>
    <technique_common><accessor source="#{node}-input-array" count="{n}" stride="1"/></technique_common>
  </source>
  <source id="{node}-output">
    <float_array id="{node}-output-array" count="{m}">{values}</float_array>
    <technique_common><accessor source="#{node}-output-array" count="{n}" stride="16"/></technique_common>
  </source>
  <sampler id="{node}-sampler">
    <input semantic="INPUT" source="#{node}-input"/>
    <input semantic="OUTPUT" source="#{node}-output"/>
  </sampler>
  <channel source="#{node}-sampler" target="{node}/transform"/>
</animation>"##,
            n = times.len(),
            m = xs.len() * 16,
            values = matrices(xs),
        )
    }

    fn extract(animations: &str) -> AnimationData {
        let animations = parse_bytes(animations.as_bytes()).unwrap();
        let scenes = parse_bytes(SCENES.as_bytes()).unwrap();
        AnimationExtractor::new(Some(&animations), Some(&scenes), Mat4::IDENTITY).extract()
    }

    fn x_of(frame: &KeyFrameData, joint: &str) -> f32 {
        frame
            .joint_transforms
            .iter()
            .find(|t| t.joint_name_id == joint)
            .unwrap()
            .joint_local_transform
            .transform_point3(Vec3::ZERO)
            .x
    }

    fn hip_and_knee() -> AnimationData {
        extract(&format!(
            "<library_animations>{}{}</library_animations>",
            channel("Armature_hip", &[0.0, 1.0], &[0.0, 2.0]),
            channel("Armature_knee", &[0.5], &[7.0]),
        ))
    }

    #[test]
    fn test_merged_time_axis() {
        let data = hip_and_knee();

        let times: Vec<f32> = data.key_frames.iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0]);
        assert_eq!(data.length_seconds, 1.0);
        assert!(data.errors.is_empty());
    }

    #[test]
    fn test_values_held_forward() {
        let data = hip_and_knee();

        // hip holds its t=0 sample at t=0.5
        assert_eq!(x_of(&data.key_frames[1], "hip"), 0.0);
        assert_eq!(x_of(&data.key_frames[2], "hip"), 2.0);
        // knee uses its only sample everywhere, including before it
        for frame in &data.key_frames {
            assert_eq!(x_of(frame, "knee"), 7.0);
        }
    }

    #[test]
    fn test_every_frame_has_every_joint() {
        let data = hip_and_knee();
        for frame in &data.key_frames {
            assert_eq!(frame.joint_transforms.len(), 2);
        }
        assert_eq!(data.joint_names(), vec!["hip", "knee"]);
    }

    #[test]
    fn test_times_strictly_increasing() {
        let data = extract(&format!(
            "<library_animations>{}{}</library_animations>",
            channel("Armature_hip", &[0.0, 0.25, 1.0], &[0.0, 1.0, 2.0]),
            channel("Armature_knee", &[0.0, 0.25, 0.75], &[0.0, 1.0, 2.0]),
        ));

        assert_eq!(data.key_frames.len(), 4);
        for pair in data.key_frames.windows(2) {
            assert!(pair[1].time > pair[0].time);
        }
    }

    #[test]
    fn test_nested_animations() {
        let data = extract(&format!(
            r#"<library_animations><animation id="clip">{}</animation></library_animations>"#,
            channel("Armature_knee", &[0.0, 2.0], &[0.0, 1.0]),
        ));

        assert_eq!(data.length_seconds, 2.0);
        assert_eq!(data.joint_names(), vec!["knee"]);
    }

    #[test]
    fn test_unknown_target_kept_verbatim() {
        let data = extract(&format!(
            "<library_animations>{}</library_animations>",
            channel("Prop", &[0.0], &[1.0]),
        ));
        assert_eq!(data.joint_names(), vec!["Prop"]);
    }

    #[test]
    fn test_component_channels_skipped() {
        let doc = channel("Armature_hip", &[0.0], &[1.0]).replace("/transform", "/location.X");
        let data = extract(&format!("<library_animations>{}</library_animations>", doc));

        assert!(data.key_frames.is_empty());
        assert!(data.errors.is_empty());
    }

    #[test]
    fn test_malformed_channel_recorded() {
        let broken = channel("Armature_hip", &[0.0, 1.0], &[0.0, 1.0]).replace(
            r#"count="32">"#,
            r#"count="16">"#,
        );
        let doc = format!(
            "<library_animations>{}{}</library_animations>",
            broken,
            channel("Armature_knee", &[0.0], &[3.0]),
        );
        let data = extract(&doc);

        assert_eq!(data.errors.len(), 1);
        assert_eq!(data.joint_names(), vec!["knee"]);
    }

    #[test]
    fn test_root_joint_corrected() {
        let animations = parse_bytes(
            format!(
                "<library_animations>{}</library_animations>",
                channel("Armature_hip", &[0.0], &[1.0])
            )
            .as_bytes(),
        )
        .unwrap();
        let scenes = parse_bytes(SCENES.as_bytes()).unwrap();
        let correction = rig_math::UpAxis::X.correction();
        let data = AnimationExtractor::new(Some(&animations), Some(&scenes), correction).extract();

        let hip = data.key_frames[0].joint_transforms[0].joint_local_transform;
        let origin = hip.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_root_found_through_skin_joints() {
        let scenes = parse_bytes(
            br#"<library_visual_scenes>
  <visual_scene id="Scene">
    <node id="Cam_rig" sid="camroot" type="JOINT"/>
    <node id="Armature">
      <node id="Armature_hip" sid="hip" type="JOINT"/>
    </node>
  </visual_scene>
</library_visual_scenes>"#,
        )
        .unwrap();
        let animations = parse_bytes(
            format!(
                "<library_animations>{}</library_animations>",
                channel("Armature_hip", &[0.0], &[1.0])
            )
            .as_bytes(),
        )
        .unwrap();
        let correction = rig_math::UpAxis::X.correction();
        let data = AnimationExtractor::new(Some(&animations), Some(&scenes), correction)
            .with_skin_joints(["Armature_hip"])
            .extract();

        let hip = data.key_frames[0].joint_transforms[0].joint_local_transform;
        assert_eq!(data.joint_names(), vec!["hip"]);
        assert!((hip.transform_point3(Vec3::ZERO) - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_hip_three_samples_knee_two() {
        let data = extract(&format!(
            "<library_animations>{}{}</library_animations>",
            channel("Armature_hip", &[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0]),
            channel("Armature_knee", &[0.0, 2.0], &[5.0, 9.0]),
        ));

        let times: Vec<f32> = data.key_frames.iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(data.length_seconds, 2.0);
        assert_eq!(x_of(&data.key_frames[1], "hip"), 1.0);
        assert_eq!(x_of(&data.key_frames[1], "knee"), x_of(&data.key_frames[0], "knee"));
        assert_eq!(x_of(&data.key_frames[2], "knee"), 9.0);
    }

    #[test]
    fn test_no_library() {
        let data = AnimationExtractor::new(None, None, Mat4::IDENTITY).extract();
        assert!(data.key_frames.is_empty());
        assert_eq!(data.length_seconds, 0.0);
    }
}
