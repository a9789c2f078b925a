// Transform utilities for Mat4
//
// COLLADA stores matrices row-major and allows node transforms to be given
// either as a single matrix or as a sequence of translate/rotate/scale ops.
// glam::Mat4 is column-major, so everything coming out of a document passes
// through these helpers.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3};

/// Extension trait for Mat4 covering the conversions the loaders need.
pub trait Mat4Ext: Sized {
    /// Build a matrix from 16 row-major floats.
    ///
    /// Returns `None` when the slice does not hold exactly 16 values.
    fn from_row_major(values: &[f32]) -> Option<Self>;

    /// Transform a surface normal (inverse-transpose of the upper 3x3),
    /// renormalized. Degenerate input yields `Vec3::ZERO`.
    fn transform_normal3(&self, normal: Vec3) -> Vec3;
}

impl Mat4Ext for Mat4 {
    fn from_row_major(values: &[f32]) -> Option<Self> {
        let array: [f32; 16] = values.try_into().ok()?;
        Some(Mat4::from_cols_array(&array).transpose())
    }

    fn transform_normal3(&self, normal: Vec3) -> Vec3 {
        self.inverse()
            .transpose()
            .transform_vector3(normal)
            .normalize_or_zero()
    }
}

/// The `<up_axis>` declared in a document's `<asset>` block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpAxis {
    X,
    #[default]
    Y,
    Z,
}

impl UpAxis {
    /// Parse the COLLADA spelling (`X_UP`, `Y_UP`, `Z_UP`).
    pub fn from_collada(value: &str) -> Option<Self> {
        match value.trim() {
            "X_UP" => Some(UpAxis::X),
            "Y_UP" => Some(UpAxis::Y),
            "Z_UP" => Some(UpAxis::Z),
            _ => None,
        }
    }

    /// Rotation that maps this axis onto +Y.
    pub fn correction(self) -> Mat4 {
        match self {
            UpAxis::X => Mat4::from_rotation_z(FRAC_PI_2),
            UpAxis::Y => Mat4::IDENTITY,
            UpAxis::Z => Mat4::from_rotation_x(-FRAC_PI_2),
        }
    }
}

/// Transform operation types found on a `<node>`.
#[derive(Clone, Debug, PartialEq)]
pub enum TransformOp {
    /// `<translate>`
    Translate(Vec3),

    /// `<rotate>`: axis followed by an angle in degrees
    Rotate { axis: Vec3, degrees: f32 },

    /// `<scale>`
    Scale(Vec3),

    /// `<matrix>`, already converted to column-major
    Matrix(Mat4),
}

impl TransformOp {
    /// Convert this operation to a transformation matrix.
    pub fn to_matrix(&self) -> Mat4 {
        match self {
            TransformOp::Translate(t) => Mat4::from_translation(*t),
            TransformOp::Rotate { axis, degrees } => {
                let axis = axis.normalize_or_zero();
                if axis == Vec3::ZERO {
                    Mat4::IDENTITY
                } else {
                    Mat4::from_axis_angle(axis, degrees.to_radians())
                }
            }
            TransformOp::Scale(s) => Mat4::from_scale(*s),
            TransformOp::Matrix(m) => *m,
        }
    }
}

/// Combine a list of ops, in document order, into a single matrix.
pub fn compose_transform_ops(ops: &[TransformOp]) -> Mat4 {
    ops.iter()
        .fold(Mat4::IDENTITY, |result, op| result * op.to_matrix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_row_major_translation() {
        // Translation lives in the last column of a row-major matrix
        let values = [
            1.0, 0.0, 0.0, 5.0, //
            0.0, 1.0, 0.0, 6.0, //
            0.0, 0.0, 1.0, 7.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let mat = Mat4::from_row_major(&values).unwrap();
        let origin = mat.transform_point3(Vec3::ZERO);

        assert_eq!(origin, Vec3::new(5.0, 6.0, 7.0));
    }

    #[test]
    fn test_from_row_major_wrong_length() {
        assert!(Mat4::from_row_major(&[1.0; 15]).is_none());
        assert!(Mat4::from_row_major(&[1.0; 17]).is_none());
    }

    #[test]
    fn test_transform_normal_ignores_translation() {
        let mat = Mat4::from_translation(Vec3::new(10.0, 20.0, 30.0));
        let normal = mat.transform_normal3(Vec3::Y);

        assert!((normal - Vec3::Y).length() < 0.001);
    }

    #[test]
    fn test_transform_normal_non_uniform_scale() {
        let mat = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = Vec3::new(1.0, 1.0, 0.0).normalize();
        let transformed = mat.transform_normal3(n);

        assert!((transformed.length() - 1.0).abs() < 0.001);
        // Scaling X stretches the surface, so the normal leans toward Y
        assert!(transformed.y > transformed.x);
    }

    #[test]
    fn test_z_up_correction() {
        let up = UpAxis::Z.correction().transform_vector3(Vec3::Z);
        assert!((up - Vec3::Y).length() < 0.001);
    }

    #[test]
    fn test_x_up_correction() {
        let up = UpAxis::X.correction().transform_vector3(Vec3::X);
        assert!((up - Vec3::Y).length() < 0.001);
    }

    #[test]
    fn test_up_axis_parse() {
        assert_eq!(UpAxis::from_collada(" Z_UP "), Some(UpAxis::Z));
        assert_eq!(UpAxis::from_collada("Y_UP"), Some(UpAxis::Y));
        assert_eq!(UpAxis::from_collada("W_UP"), None);
    }

    #[test]
    fn test_compose_ops_order() {
        // translate then rotate: the rotation is applied first to the point
        let ops = [
            TransformOp::Translate(Vec3::new(1.0, 0.0, 0.0)),
            TransformOp::Rotate {
                axis: Vec3::Z,
                degrees: 90.0,
            },
        ];
        let point = compose_transform_ops(&ops).transform_point3(Vec3::X);

        assert!((point - Vec3::new(1.0, 1.0, 0.0)).length() < 0.001);
    }

    #[test]
    fn test_rotate_zero_axis_is_identity() {
        let op = TransformOp::Rotate {
            axis: Vec3::ZERO,
            degrees: 45.0,
        };
        assert_eq!(op.to_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_mat4_inverse() {
        let mat = Mat4::from_translation(Vec3::new(10.0, 20.0, 30.0));
        let inv = mat.inverse();

        let point = Vec3::new(1.0, 2.0, 3.0);
        let back = inv.transform_point3(mat.transform_point3(point));

        assert!((back - point).length() < 0.001);
    }
}
