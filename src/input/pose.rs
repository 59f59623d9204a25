//! Conversion between runtime transform matrices and [`Pose`]

use glam::{Mat3, Quat, Vec3};

use crate::devices::Pose;
use crate::tracking::Matrix34;

/// Translation column of the transform
pub fn position_from_matrix(m: &Matrix34) -> Vec3 {
    Vec3::new(m[0][3], m[1][3], m[2][3])
}

/// Rotation part of the transform as a quaternion.
///
/// Every component magnitude comes from the diagonal, the signs of x, y and z from the
/// antisymmetric part. No branch on the sign of the trace.
pub fn orientation_from_matrix(m: &Matrix34) -> Quat {
    let w = (1.0 + m[0][0] + m[1][1] + m[2][2]).max(0.0).sqrt() / 2.0;
    let x = (1.0 + m[0][0] - m[1][1] - m[2][2]).max(0.0).sqrt() / 2.0;
    let y = (1.0 - m[0][0] + m[1][1] - m[2][2]).max(0.0).sqrt() / 2.0;
    let z = (1.0 - m[0][0] - m[1][1] + m[2][2]).max(0.0).sqrt() / 2.0;

    Quat::from_xyzw(
        x.copysign(m[2][1] - m[1][2]),
        y.copysign(m[0][2] - m[2][0]),
        z.copysign(m[1][0] - m[0][1]),
        w,
    )
}

pub fn pose_from_matrix(m: &Matrix34) -> Pose {
    Pose {
        position: position_from_matrix(m),
        orientation: orientation_from_matrix(m),
    }
}

/// Builds the row-major transform for a position and orientation
pub fn matrix_from_pose(position: Vec3, orientation: Quat) -> Matrix34 {
    let rotation = Mat3::from_quat(orientation);
    let mut m = [[0.0; 4]; 3];
    for (row, values) in m.iter_mut().enumerate() {
        for (col, value) in values.iter_mut().take(3).enumerate() {
            *value = rotation.col(col)[row];
        }
        values[3] = position[row];
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::IDENTITY_MATRIX34;
    use std::f32::consts::{FRAC_PI_2, PI};

    const EPS: f32 = 1e-5;

    fn assert_same_rotation(actual: Quat, expected: Quat) {
        // q and -q describe the same rotation
        assert!(
            actual.dot(expected).abs() > 1.0 - EPS,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn identity_matrix() {
        let pose = pose_from_matrix(&IDENTITY_MATRIX34);
        assert_eq!(pose.position, Vec3::ZERO);
        assert_eq!(pose.orientation, Quat::from_xyzw(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn translation_column() {
        let mut m = IDENTITY_MATRIX34;
        m[0][3] = 0.25;
        m[1][3] = 1.5;
        m[2][3] = -3.0;
        assert_eq!(position_from_matrix(&m), Vec3::new(0.25, 1.5, -3.0));
    }

    #[test]
    fn quarter_turns_about_each_axis() {
        for expected in [
            Quat::from_rotation_x(FRAC_PI_2),
            Quat::from_rotation_y(FRAC_PI_2),
            Quat::from_rotation_z(FRAC_PI_2),
            Quat::from_rotation_x(-FRAC_PI_2),
        ] {
            let m = matrix_from_pose(Vec3::ZERO, expected);
            assert_same_rotation(orientation_from_matrix(&m), expected);
        }
    }

    #[test]
    fn recovers_arbitrary_rotations() {
        for step in 0..24 {
            let angle = -PI * 0.95 + step as f32 * 0.08;
            let axis = Vec3::new(0.3, -1.0, 0.6 + step as f32 * 0.1).normalize();
            let expected = Quat::from_axis_angle(axis, angle);
            let position = Vec3::new(step as f32, -0.5, 2.0);

            let pose = pose_from_matrix(&matrix_from_pose(position, expected));
            assert_same_rotation(pose.orientation, expected);
            assert!((pose.position - position).length() < EPS);
        }
    }

    #[test]
    fn output_is_unit_norm() {
        for step in 0..64 {
            let t = step as f32 * 0.37;
            let axis = Vec3::new(t.sin(), t.cos(), (2.0 * t).sin() + 0.1).normalize();
            let rotation = Quat::from_axis_angle(axis, t * 1.7);
            let q = orientation_from_matrix(&matrix_from_pose(Vec3::ONE, rotation));
            assert!((q.length() - 1.0).abs() < 1e-4, "{q:?} has length {}", q.length());
        }
    }

    #[test]
    fn half_turn_has_zero_w() {
        let m = matrix_from_pose(Vec3::ZERO, Quat::from_rotation_z(PI));
        let q = orientation_from_matrix(&m);
        assert!(q.w.abs() < 1e-3);
        assert!((q.z.abs() - 1.0).abs() < EPS);
    }
}
