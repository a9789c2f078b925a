//! Skin weight extraction from `<library_controllers>`.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use rig_math::{Mat4, Mat4Ext};
use serde::Serialize;

use super::source::{
    find_source, input_stride, parse_floats, parse_indices, read_float_source, read_inputs, read_name_source, strip_hash,
};
use super::ColladaError;
use crate::mesh::NO_JOINT;
use crate::xml::XmlNode;

/// Joint influences of one source vertex.
///
/// After [`limit`](Self::limit) both arrays hold exactly `max_weights`
/// entries, sorted by descending weight, summing to one.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VertexSkinData {
    pub joint_ids: Vec<i32>,
    pub weights: Vec<f32>,
}

impl VertexSkinData {
    pub fn add_influence(&mut self, joint_id: i32, weight: f32) {
        self.joint_ids.push(joint_id);
        self.weights.push(weight);
    }

    /// Keep the `max_weights` strongest influences, renormalize them and
    /// zero-pad to exactly `max_weights` slots.
    ///
    /// A vertex without any positive weight is bound to [`NO_JOINT`].
    pub fn limit(&mut self, max_weights: usize) {
        let max_weights = max_weights.max(1);
        let mut pairs: Vec<(i32, f32)> = self
            .joint_ids
            .iter()
            .copied()
            .zip(self.weights.iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs.truncate(max_weights);

        let total: f32 = pairs.iter().map(|(_, weight)| weight).sum();
        if total > 0.0 && total.is_finite() {
            for (_, weight) in &mut pairs {
                *weight /= total;
            }
        } else {
            pairs = vec![(NO_JOINT, 1.0)];
        }
        pairs.resize(max_weights, (0, 0.0));

        (self.joint_ids, self.weights) = pairs.into_iter().unzip();
    }

    /// Rewrite joint ids through `map`, dropping influences it cannot map,
    /// then re-limit to `max_weights`.
    ///
    /// Padding slots and [`NO_JOINT`] are left alone. Returns the ids that
    /// could not be mapped.
    pub(crate) fn remap(&mut self, max_weights: usize, map: impl Fn(i32) -> Option<i32>) -> Vec<i32> {
        let mut remapped = VertexSkinData::default();
        let mut unmapped = Vec::new();
        for (&joint_id, &weight) in self.joint_ids.iter().zip(&self.weights) {
            if weight <= 0.0 || joint_id == NO_JOINT {
                remapped.add_influence(joint_id, weight);
                continue;
            }
            match map(joint_id) {
                Some(mapped) => remapped.add_influence(mapped, weight),
                None => unmapped.push(joint_id),
            }
        }
        remapped.limit(max_weights);
        *self = remapped;
        unmapped
    }
}

/// Skin of one controller.
#[derive(Clone, Debug, Serialize)]
pub struct SkinningData {
    pub controller_id: String,

    /// Geometry the skin binds
    pub geometry_id: String,

    /// Joint names in bind order; the position of a name is its skin index
    pub joint_names: Vec<String>,

    pub bind_shape_matrix: Mat4,

    /// One entry per source position of the geometry
    pub vertex_weights: Vec<VertexSkinData>,
}

impl SkinningData {
    /// Skin-local index of a joint name.
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joint_names.iter().position(|joint| joint == name)
    }
}

/// Reads every skin controller of a document.
pub struct SkinExtractor<'a> {
    controllers: Option<&'a XmlNode>,
    max_weights: usize,
}

impl<'a> SkinExtractor<'a> {
    pub fn new(library_controllers: Option<&'a XmlNode>, max_weights: usize) -> Self {
        Self {
            controllers: library_controllers,
            max_weights: max_weights.max(1),
        }
    }

    /// Skins keyed by the id of the geometry they bind.
    ///
    /// Broken controllers are skipped and reported in the returned list.
    pub fn extract(&self) -> (BTreeMap<String, SkinningData>, Vec<ColladaError>) {
        let mut skins = BTreeMap::new();
        let mut errors = Vec::new();

        let Some(controllers) = self.controllers else {
            return (skins, errors);
        };

        for controller in controllers.children("controller") {
            let controller_id = controller.attribute("id").unwrap_or("");
            let Some(skin) = controller.child("skin") else {
                log::debug!("Controller {} has no skin, skipping", controller_id);
                continue;
            };
            match self.extract_skin(controller_id, skin) {
                Ok(data) => {
                    log::debug!(
                        "Skin {} -> {}: {} joints, {} vertices",
                        controller_id,
                        data.geometry_id,
                        data.joint_names.len(),
                        data.vertex_weights.len()
                    );
                    match skins.entry(data.geometry_id.clone()) {
                        Entry::Vacant(slot) => {
                            slot.insert(data);
                        }
                        Entry::Occupied(existing) => {
                            let error = ColladaError::invalid(
                                controller_id,
                                format!(
                                    "geometry {} is already skinned by {}, ignoring",
                                    data.geometry_id,
                                    existing.get().controller_id
                                ),
                            );
                            log::warn!("{}", error);
                            errors.push(error);
                        }
                    }
                }
                Err(message) => {
                    let error = ColladaError::invalid(controller_id, message);
                    log::warn!("{}", error);
                    errors.push(error);
                }
            }
        }

        (skins, errors)
    }

    fn extract_skin(&self, controller_id: &str, skin: &XmlNode) -> Result<SkinningData, String> {
        let geometry_id = strip_hash(skin.attribute("source").unwrap_or("")).to_string();

        let bind_shape_matrix = match skin.child("bind_shape_matrix") {
            Some(node) => {
                let values = parse_floats(node.text())?;
                Mat4::from_row_major(&values)
                    .ok_or_else(|| format!("bind_shape_matrix has {} values", values.len()))?
            }
            None => Mat4::IDENTITY,
        };

        let vertex_weights = skin
            .child("vertex_weights")
            .ok_or("skin has no vertex_weights")?;
        let inputs = read_inputs(vertex_weights)?;
        let joint_input = inputs
            .iter()
            .find(|input| input.semantic == "JOINT")
            .ok_or("vertex_weights has no JOINT input")?;
        let weight_input = inputs
            .iter()
            .find(|input| input.semantic == "WEIGHT")
            .ok_or("vertex_weights has no WEIGHT input")?;
        let stride = input_stride(&inputs)?;

        let joint_names = read_name_source(
            find_source(skin, joint_input.source)
                .ok_or_else(|| format!("joint source {} not found", joint_input.source))?,
        )?;
        let weights = read_float_source(
            find_source(skin, weight_input.source)
                .ok_or_else(|| format!("weight source {} not found", weight_input.source))?,
        )?
        .data;

        let counts = parse_indices(vertex_weights.child("vcount").map(XmlNode::text).unwrap_or(""))?;
        let stream = parse_signed(vertex_weights.child("v").map(XmlNode::text).unwrap_or(""))?;

        if let Some(count) = vertex_weights
            .parse_attribute::<usize>("count")
            .map_err(|e| e.to_string())?
        {
            if count != counts.len() {
                return Err(format!(
                    "vertex_weights declares {} vertices but vcount has {}",
                    count,
                    counts.len()
                ));
            }
        }

        let mut pointer: usize = 0;
        let mut vertices = Vec::with_capacity(counts.len());
        for count in counts {
            let mut vertex = VertexSkinData::default();
            for _ in 0..count {
                let at = |offset: usize| pointer.checked_add(offset).and_then(|index| stream.get(index));
                let (Some(&joint), Some(&weight)) = (at(joint_input.offset), at(weight_input.offset)) else {
                    return Err("v stream shorter than vcount requires".to_string());
                };
                pointer = pointer.saturating_add(stride);

                let weight = usize::try_from(weight)
                    .ok()
                    .and_then(|index| weights.get(index))
                    .copied()
                    .ok_or_else(|| format!("weight index {} out of range", weight))?;

                // -1 binds to the bind shape itself
                let joint_id = if joint < 0 {
                    NO_JOINT
                } else if (joint as usize) < joint_names.len() {
                    joint as i32
                } else {
                    return Err(format!("joint index {} out of range", joint));
                };
                vertex.add_influence(joint_id, weight);
            }
            vertex.limit(self.max_weights);
            vertices.push(vertex);
        }

        Ok(SkinningData {
            controller_id: controller_id.to_string(),
            geometry_id,
            joint_names,
            bind_shape_matrix,
            vertex_weights: vertices,
        })
    }
}

fn parse_signed(text: &str) -> Result<Vec<i64>, String> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<i64>()
                .map_err(|_| format!("invalid index '{}'", token))
        })
        .collect()
}
