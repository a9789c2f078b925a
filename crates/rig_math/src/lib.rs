// Re-export glam for convenience
pub use glam::*;

// Rig math helpers
mod transform;
pub use transform::{compose_transform_ops, Mat4Ext, TransformOp, UpAxis};
