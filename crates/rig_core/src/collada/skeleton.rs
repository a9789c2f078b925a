//! Joint hierarchy extraction from `<library_visual_scenes>`.

use std::collections::{HashMap, HashSet};

use rig_math::{compose_transform_ops, Mat4, Mat4Ext, TransformOp, Vec3};

use super::source::{parse_floats, strip_hash};
use super::ColladaError;
use crate::skeleton::{JointData, SkeletonData};
use crate::xml::XmlNode;

/// Local transform of a `<node>`, composed from its transform children in
/// document order.
pub(crate) fn node_transform(node: &XmlNode) -> Result<Mat4, String> {
    let mut ops = Vec::new();
    for child in node.all_children() {
        let op = match child.name() {
            "matrix" => {
                let values = parse_floats(child.text())?;
                TransformOp::Matrix(
                    Mat4::from_row_major(&values)
                        .ok_or_else(|| format!("matrix has {} values", values.len()))?,
                )
            }
            "translate" => TransformOp::Translate(vec3(child)?),
            "scale" => TransformOp::Scale(vec3(child)?),
            "rotate" => match parse_floats(child.text())?.as_slice() {
                [x, y, z, degrees] => TransformOp::Rotate {
                    axis: Vec3::new(*x, *y, *z),
                    degrees: *degrees,
                },
                values => return Err(format!("rotate has {} values", values.len())),
            },
            "lookat" | "skew" => {
                log::debug!("Ignoring <{}> on node", child.name());
                continue;
            }
            _ => continue,
        };
        ops.push(op);
    }
    Ok(compose_transform_ops(&ops))
}

fn vec3(node: &XmlNode) -> Result<Vec3, String> {
    match parse_floats(node.text())?.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        values => Err(format!("<{}> has {} values", node.name(), values.len())),
    }
}

/// Canonical name of a joint node: its `sid`, then `name`, then `id`.
///
/// Skeleton joints and animation tracks are both named this way, so a pose
/// sampled from an animation addresses the joints of the skeleton.
pub(crate) fn joint_node_name(node: &XmlNode) -> Option<&str> {
    node.attribute("sid")
        .or_else(|| node.attribute("name"))
        .or_else(|| node.attribute("id"))
}

/// Subtree named by the first `<instance_controller><skeleton>`, if any.
fn skeleton_scope(scenes: &XmlNode) -> Option<&XmlNode> {
    let url = scenes
        .descendants()
        .filter(|node| node.name() == "instance_controller")
        .find_map(|instance| instance.child("skeleton"))?
        .text();
    let id = strip_hash(url);
    let scope = scenes
        .descendants()
        .find(|node| node.name() == "node" && node.attribute("id") == Some(id));
    if scope.is_none() {
        log::debug!("Skeleton node {} not found, searching the whole scene", id);
    }
    scope
}

/// `<node>`s a skeleton root is searched among, in document order: the
/// skeleton scope and its descendants, or every node of the scenes.
pub(crate) fn root_candidates(scenes: &XmlNode) -> Box<dyn Iterator<Item = &XmlNode> + '_> {
    let nodes: Box<dyn Iterator<Item = &XmlNode> + '_> = match skeleton_scope(scenes) {
        Some(scope) => Box::new(std::iter::once(scope).chain(scope.descendants())),
        None => Box::new(scenes.descendants()),
    };
    Box::new(nodes.filter(|node| node.name() == "node"))
}

/// The skin joint name a node is bound by: its `sid`, `name` or `id`,
/// whichever is one of `skin_joints`.
pub(crate) fn skin_joint_name<'n>(node: &'n XmlNode, skin_joints: &HashSet<&str>) -> Option<&'n str> {
    ["sid", "name", "id"]
        .into_iter()
        .filter_map(|attribute| node.attribute(attribute))
        .find(|name| skin_joints.contains(*name))
}

/// An extracted skeleton together with the skin names bound to its joints.
#[derive(Debug, Clone)]
pub struct BoundSkeleton {
    pub data: SkeletonData,
    /// Skin joint name to joint index. Skins may name a joint by any of its
    /// `sid`, `name` or `id`, so these keys can differ from the joint names.
    pub skin_joints: HashMap<String, usize>,
}

/// Builds the joint tree bound by a set of skin joint names.
pub struct SkeletonExtractor<'a> {
    visual_scenes: Option<&'a XmlNode>,
    joint_names: HashSet<&'a str>,
    correction: Mat4,
}

impl<'a> SkeletonExtractor<'a> {
    /// `joint_names` are the names the skins bind to; `correction` is the
    /// up-axis rotation applied to the root joint.
    pub fn new(
        library_visual_scenes: Option<&'a XmlNode>,
        joint_names: impl IntoIterator<Item = &'a str>,
        correction: Mat4,
    ) -> Self {
        Self {
            visual_scenes: library_visual_scenes,
            joint_names: joint_names.into_iter().collect(),
            correction,
        }
    }

    /// Extract the skeleton, or `None` when no node carries a skin joint name.
    pub fn extract(&self) -> (Option<BoundSkeleton>, Vec<ColladaError>) {
        let mut errors = Vec::new();
        let Some(scenes) = self.visual_scenes else {
            return (None, errors);
        };
        if self.joint_names.is_empty() {
            return (None, errors);
        }

        let Some((root_node, root_name)) =
            root_candidates(scenes).find_map(|node| skin_joint_name(node, &self.joint_names).map(|name| (node, name)))
        else {
            log::warn!("No scene node matches any skin joint name");
            return (None, errors);
        };

        let own_transform = self.transform_or_identity(root_node, &mut errors);
        let mut builder = Builder {
            extractor: self,
            next_index: 0,
            seen: HashSet::new(),
            skin_joints: HashMap::new(),
            errors: &mut errors,
        };
        let root = builder.joint(root_node, root_name, Mat4::IDENTITY, self.correction * own_transform);
        let joint_count = builder.next_index;
        let skin_joints = builder.skin_joints;

        let missing: Vec<&str> = self
            .joint_names
            .iter()
            .copied()
            .filter(|name| !skin_joints.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            log::debug!("{} skin joints outside the skeleton: {:?}", missing.len(), missing);
        }

        log::debug!("Skeleton rooted at {} with {} joints", root.name, joint_count);
        let data = SkeletonData { root, joint_count };
        (Some(BoundSkeleton { data, skin_joints }), errors)
    }

    fn transform_or_identity(&self, node: &XmlNode, errors: &mut Vec<ColladaError>) -> Mat4 {
        node_transform(node).unwrap_or_else(|message| {
            let error = ColladaError::invalid(node.attribute("id").unwrap_or("node"), message);
            log::warn!("{}", error);
            errors.push(error);
            Mat4::IDENTITY
        })
    }
}

struct Builder<'e, 'a> {
    extractor: &'e SkeletonExtractor<'a>,
    next_index: usize,
    /// Skin and canonical names of the joints built so far.
    seen: HashSet<&'e str>,
    skin_joints: HashMap<String, usize>,
    errors: &'e mut Vec<ColladaError>,
}

impl<'e, 'a: 'e> Builder<'e, 'a> {
    fn joint(&mut self, node: &'e XmlNode, skin_name: &'e str, parent_world: Mat4, local: Mat4) -> JointData {
        let index = self.next_index;
        self.next_index += 1;

        let name = joint_node_name(node).unwrap_or(skin_name);
        self.seen.insert(skin_name);
        self.seen.insert(name);
        self.skin_joints.insert(skin_name.to_string(), index);

        let world = parent_world * local;
        let mut joint = JointData::new(index, name, local, world.inverse());
        self.children(node, world, Mat4::IDENTITY, &mut joint.children);
        joint
    }

    /// Collect the joints under `node`. Nodes that are not joints are
    /// flattened away and their transform is folded into `pending`.
    fn children(&mut self, node: &'e XmlNode, parent_world: Mat4, pending: Mat4, out: &mut Vec<JointData>) {
        for child in node.children("node") {
            let local = pending * self.extractor.transform_or_identity(child, self.errors);
            match skin_joint_name(child, &self.extractor.joint_names) {
                Some(name) if !self.is_built(child, name) => {
                    out.push(self.joint(child, name, parent_world, local));
                }
                Some(name) => {
                    log::debug!("Duplicate joint node {}, treating as plain node", name);
                    self.children(child, parent_world, local, out);
                }
                None => self.children(child, parent_world, local, out),
            }
        }
    }

    fn is_built(&self, node: &XmlNode, skin_name: &str) -> bool {
        self.seen.contains(skin_name) || joint_node_name(node).is_some_and(|name| self.seen.contains(name))
    }
}
