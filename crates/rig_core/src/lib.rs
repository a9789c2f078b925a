//! Rig Core - skinned model and animation loading.
//!
//! This crate provides:
//!
//! - **XML tree reading**: `xml::parse` builds an immutable element tree
//! - **COLLADA loading**: meshes, skin weights, joint hierarchy, animations
//! - **OBJ loading**: static meshes through `tobj`
//! - **Playable types**: `Skeleton` and `Animation`, posed by name
//!
//! # Example
//!
//! ```ignore
//! use rig_core::collada::{load_animation, load_collada_model};
//!
//! let model = load_collada_model(std::fs::File::open("model.dae")?, 3)?;
//! let animation = load_animation(std::fs::File::open("run.dae")?)?;
//!
//! let mut skeleton = model.skeleton().expect("model is skinned");
//! skeleton.apply_pose(&animation.pose_at(0.5));
//! let matrices = skeleton.joint_matrices();
//! ```

pub mod animation;
pub mod collada;
pub mod mesh;
pub mod model;
pub mod obj;
pub mod skeleton;
pub mod xml;

// Re-export commonly used types
pub use animation::{Animation, AnimationData, JointTransform, JointTransformData, KeyFrame, KeyFrameData};
pub use collada::{
    load_animation, load_collada_animation, load_collada_model, load_collada_model_with_options, ColladaError,
    ColladaResult, LoadOptions,
};
pub use mesh::{MeshData, NO_JOINT};
pub use model::AnimatedModelData;
pub use obj::{load_obj_model, ObjError};
pub use skeleton::{Joint, JointData, Skeleton, SkeletonData};
pub use crate::xml::{XmlError, XmlNode};
