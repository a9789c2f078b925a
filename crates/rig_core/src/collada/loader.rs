//! High-level COLLADA loading.
//!
//! This module provides the entry points that run the extractors in order
//! (skins, then skeleton, then geometry) and assemble their output into an
//! [`AnimatedModelData`]. Animation clips are loaded separately so a model
//! and its animations may live in different files.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use rig_math::{Mat4, UpAxis};

use super::{
    AnimationExtractor, ColladaError, ColladaResult, GeometryExtractor, LoadOptions, SkeletonExtractor, SkinExtractor,
    SkinningData,
};
use crate::animation::{Animation, AnimationData};
use crate::model::AnimatedModelData;
use crate::xml::{self, XmlNode};

/// Load a skinned model, keeping at most `max_weights` joint influences per
/// vertex.
///
/// # Example
///
/// ```ignore
/// use rig_core::collada::load_collada_model;
///
/// let file = std::fs::File::open("character.dae")?;
/// let model = load_collada_model(std::io::BufReader::new(file), 3)?;
/// println!("{} meshes, {} joints", model.mesh_count(), model.joint_count());
/// ```
pub fn load_collada_model<R: Read>(reader: R, max_weights: usize) -> ColladaResult<AnimatedModelData> {
    load_collada_model_with_options(reader, &LoadOptions::with_max_weights(max_weights))
}

pub fn load_collada_model_with_options<R: Read>(reader: R, options: &LoadOptions) -> ColladaResult<AnimatedModelData> {
    let document = xml::parse(reader)?;
    assemble_model(&document, options)
}

/// Load a model from a string (useful for testing).
pub fn load_collada_model_from_str(content: &str, options: &LoadOptions) -> ColladaResult<AnimatedModelData> {
    load_collada_model_with_options(content.as_bytes(), options)
}

/// Load a model from a `.dae` file.
pub fn load_collada_file<P: AsRef<Path>>(path: P, options: &LoadOptions) -> ColladaResult<AnimatedModelData> {
    let path = path.as_ref();
    log::info!("Loading COLLADA model {}", path.display());
    let file = File::open(path)?;
    load_collada_model_with_options(BufReader::new(file), options)
}

/// Load the raw key frames of a document's animations.
pub fn load_collada_animation<R: Read>(reader: R) -> ColladaResult<AnimationData> {
    let document = xml::parse(reader)?;
    Ok(extract_animation(&document, &LoadOptions::default()))
}

pub fn load_collada_animation_from_str(content: &str) -> ColladaResult<AnimationData> {
    load_collada_animation(content.as_bytes())
}

/// Load a playable animation clip.
pub fn load_animation<R: Read>(reader: R) -> ColladaResult<Animation> {
    let data = load_collada_animation(reader)?;
    Ok(Animation::from(&data))
}

/// Rotation into Y-up for the document's declared `<up_axis>`.
fn up_axis_correction(document: &XmlNode, options: &LoadOptions) -> Mat4 {
    if !options.correct_up_axis {
        return Mat4::IDENTITY;
    }
    let axis = match document.find(&["asset", "up_axis"]) {
        Some(node) => UpAxis::from_collada(node.text()).unwrap_or_else(|| {
            log::warn!("Unknown up axis '{}', assuming Y_UP", node.text());
            UpAxis::Y
        }),
        None => UpAxis::Y,
    };
    if axis != UpAxis::Y {
        log::debug!("Correcting {:?}-up document to Y-up", axis);
    }
    axis.correction()
}

fn assemble_model(document: &XmlNode, options: &LoadOptions) -> ColladaResult<AnimatedModelData> {
    if document.name() != "COLLADA" {
        log::warn!("Root element is <{}>, expected <COLLADA>", document.name());
    }

    let correction = up_axis_correction(document, options);
    let controllers = document.child("library_controllers");
    let visual_scenes = document.child("library_visual_scenes");
    let mut model = AnimatedModelData::default();

    let Some(geometries) = document.child("library_geometries") else {
        let has_skins = controllers
            .is_some_and(|library| library.children("controller").any(|c| c.child("skin").is_some()));
        if has_skins {
            return Err(ColladaError::MissingGeometryLibrary);
        }
        log::info!("Document has no geometry");
        return Ok(model);
    };

    let (skins, skin_errors) = SkinExtractor::new(controllers, options.max_weights).extract();
    model.errors.extend(skin_errors);

    let mut skin_joints = None;
    if !skins.is_empty() {
        let (skeleton, skeleton_errors) =
            SkeletonExtractor::new(visual_scenes, skin_joint_names(&skins), correction).extract();
        model.errors.extend(skeleton_errors);
        if let Some(bound) = skeleton {
            model.skeleton = Some(bound.data);
            skin_joints = Some(bound.skin_joints);
        }
    }

    let (meshes, mesh_errors) = GeometryExtractor::new(geometries)
        .with_materials(
            document.child("library_materials"),
            document.child("library_effects"),
            document.child("library_images"),
        )
        .with_material_bindings(visual_scenes)
        .with_skins(&skins, skin_joints.as_ref(), options.max_weights)
        .with_correction(correction)
        .extract();
    model.meshes = meshes;
    model.errors.extend(mesh_errors);

    log::info!(
        "Loaded {} meshes ({} skinned), {} joints, {} triangles",
        model.mesh_count(),
        model.meshes.iter().filter(|mesh| mesh.is_skinned()).count(),
        model.joint_count(),
        model.total_triangle_count()
    );
    if model.has_errors() {
        log::info!("{} problems while loading model", model.errors.len());
    }

    Ok(model)
}

/// Every joint name the skins bind to.
fn skin_joint_names(skins: &BTreeMap<String, SkinningData>) -> impl Iterator<Item = &str> {
    skins
        .values()
        .flat_map(|skin| skin.joint_names.iter().map(String::as_str))
}

fn extract_animation(document: &XmlNode, options: &LoadOptions) -> AnimationData {
    let correction = up_axis_correction(document, options);
    let (skins, _) = SkinExtractor::new(document.child("library_controllers"), options.max_weights).extract();
    let data = AnimationExtractor::new(
        document.child("library_animations"),
        document.child("library_visual_scenes"),
        correction,
    )
    .with_skin_joints(skin_joint_names(&skins))
    .extract();

    log::info!(
        "Loaded animation: {} key frames, {:.2}s, {} joints",
        data.key_frames.len(),
        data.length_seconds,
        data.joint_names().len()
    );
    data
}
