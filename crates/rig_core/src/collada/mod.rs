//! COLLADA support.
//!
//! This module turns a COLLADA document into flat mesh buffers, a joint
//! hierarchy and keyframe animation clips.
//!
//! ## Supported COLLADA Features
//!
//! - `<geometry>` meshes made of `<triangles>`, `<polylist>` or `<polygons>`
//! - `<controller>` skins (per-vertex joint weights, bind shape matrix)
//! - `<visual_scene>` node hierarchies (`<matrix>` or translate/rotate/scale)
//! - `<animation>` channels sampling full node matrices
//! - Diffuse texture and colour lookup through materials and effects
//! - `<up_axis>` correction to Y-up
//!
//! ## Not Supported
//!
//! - Morph controllers
//! - Animation of individual transform components (`location.X`, ...)
//! - External references and `<instance_node>`
//!
//! # Example
//!
//! ```ignore
//! use rig_core::collada::load_collada_model;
//!
//! let file = std::fs::File::open("model.dae")?;
//! let model = load_collada_model(std::io::BufReader::new(file), 3)?;
//! for error in &model.errors {
//!     log::warn!("{}", error);
//! }
//! ```

mod animation;
mod geometry;
mod loader;
mod skeleton;
mod skin;
mod source;

use thiserror::Error;

use crate::xml::XmlError;

pub use animation::AnimationExtractor;
pub use geometry::GeometryExtractor;
pub use loader::*;
pub use skeleton::{BoundSkeleton, SkeletonExtractor};
pub use skin::{SkinExtractor, SkinningData, VertexSkinData};

/// Errors that can occur while loading a COLLADA document.
///
/// `MalformedDocument`, `Io` and `MissingGeometryLibrary` abort a load.
/// The remaining kinds are collected alongside whatever did load.
#[derive(Error, Debug)]
pub enum ColladaError {
    #[error("Malformed document: {0}")]
    MalformedDocument(#[from] XmlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Controllers reference geometry but the document has no <library_geometries>")]
    MissingGeometryLibrary,

    #[error("Invalid geometry data in {mesh}: {message}")]
    InvalidGeometryData { mesh: String, message: String },

    #[error("Missing asset {reference} referenced by {mesh}")]
    MissingAsset { mesh: String, reference: String },

    #[error("Joint {joint} not found in skeleton")]
    SkinningMismatch { joint: String },
}

impl ColladaError {
    /// Whether this error aborts the load of the whole document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ColladaError::MalformedDocument(_)
                | ColladaError::Io(_)
                | ColladaError::MissingGeometryLibrary
        )
    }

    pub(crate) fn invalid(mesh: &str, message: impl Into<String>) -> Self {
        ColladaError::InvalidGeometryData {
            mesh: mesh.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for COLLADA loading.
pub type ColladaResult<T> = Result<T, ColladaError>;

/// Knobs for a model load.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Joint influences kept per vertex
    pub max_weights: usize,

    /// Rotate Z-up and X-up documents into Y-up
    pub correct_up_axis: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_weights: 3,
            correct_up_axis: true,
        }
    }
}

impl LoadOptions {
    pub fn with_max_weights(max_weights: usize) -> Self {
        Self {
            max_weights,
            ..Default::default()
        }
    }
}
