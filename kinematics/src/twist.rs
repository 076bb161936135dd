//! Geodesic pose errors and Jacobian-based twist resolution.

use nalgebra::{DMatrix, Isometry3, Vector3, Vector4, Vector6, SVD};

use crate::{Configuration, ForwardKinematics, KinematicsError};

const JACOBIAN_STEP: f64 = 1e-6;
const PSEUDO_INVERSE_EPSILON: f64 = 1e-9;

/// Twist `[v; w]` in the world frame that carries `current` to `goal` in unit time.
pub fn geodesic_twist(current: &Isometry3<f64>, goal: &Isometry3<f64>) -> Vector6<f64> {
    let linear = goal.translation.vector - current.translation.vector;
    let angular = (goal.rotation * current.rotation.inverse()).scaled_axis();
    Vector6::new(linear.x, linear.y, linear.z, angular.x, angular.y, angular.z)
}

/// Translation from `start` to `now` followed by the rotation angle between them.
pub fn geodesic_error(start: &Isometry3<f64>, now: &Isometry3<f64>) -> Vector4<f64> {
    let translation = now.translation.vector - start.translation.vector;
    let angle = start.rotation.angle_to(&now.rotation);
    Vector4::new(translation.x, translation.y, translation.z, angle)
}

/// Pose distance weighing one radian like one metre.
pub fn geodesic_distance(a: &Isometry3<f64>, b: &Isometry3<f64>) -> f64 {
    let error = geodesic_error(a, b);
    (error.xyz().norm_squared() + error.w * error.w).sqrt()
}

/// 6 x DOF spatial Jacobian by central differences of forward kinematics.
pub fn jacobian(kinematics: &dyn ForwardKinematics, q: &Configuration) -> DMatrix<f64> {
    let dof = q.len();
    let mut jacobian = DMatrix::zeros(6, dof);

    for column in 0..dof {
        let mut forward = q.clone();
        let mut backward = q.clone();
        forward[column] += JACOBIAN_STEP;
        backward[column] -= JACOBIAN_STEP;

        let ahead = kinematics.forward_kinematics(&forward);
        let behind = kinematics.forward_kinematics(&backward);

        let linear: Vector3<f64> =
            (ahead.translation.vector - behind.translation.vector) / (2.0 * JACOBIAN_STEP);
        let angular = (ahead.rotation * behind.rotation.inverse()).scaled_axis()
            / (2.0 * JACOBIAN_STEP);

        for row in 0..3 {
            jacobian[(row, column)] = linear[row];
            jacobian[(row + 3, column)] = angular[row];
        }
    }
    jacobian
}

/// Least-squares joint velocity realising `twist` at `q`. When velocity
/// limits are given the result is scaled down uniformly to respect them.
pub fn joint_velocity_from_twist(
    kinematics: &dyn ForwardKinematics,
    q: &Configuration,
    twist: &Vector6<f64>,
    velocity_limits: Option<&Configuration>,
) -> Result<Configuration, KinematicsError> {
    let jacobian = jacobian(kinematics, q);
    let pseudo_inverse = SVD::new(jacobian, true, true)
        .pseudo_inverse(PSEUDO_INVERSE_EPSILON)
        .map_err(KinematicsError::SingularJacobian)?;

    let twist = DMatrix::from_column_slice(6, 1, twist.as_slice());
    let dq = Configuration::from_column_slice((pseudo_inverse * twist).as_slice());

    match velocity_limits {
        Some(limits) => Ok(scale_to_limits(dq, limits)),
        None => Ok(dq),
    }
}

fn scale_to_limits(dq: Configuration, limits: &Configuration) -> Configuration {
    let ratio = dq
        .iter()
        .zip(limits.iter())
        .map(|(v, limit)| v.abs() / limit)
        .fold(0.0_f64, f64::max);

    if ratio > 1.0 { dq / ratio } else { dq }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlanarArm;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_geodesic_error_and_distance() {
        let start = Isometry3::identity();
        let now = Isometry3::from_parts(
            Translation3::new(3.0, 4.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
        );

        let error = geodesic_error(&start, &now);
        assert_relative_eq!(error.x, 3.0);
        assert_relative_eq!(error.w, FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(
            geodesic_distance(&start, &now),
            (25.0 + FRAC_PI_2 * FRAC_PI_2).sqrt(),
            epsilon = 1e-12
        );

        let twist = geodesic_twist(&start, &now);
        assert_relative_eq!(twist[1], 4.0);
        assert_relative_eq!(twist[5], FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_jacobian_of_single_link() {
        let arm = PlanarArm::new(vec![2.0]);
        let j = jacobian(&arm, &Configuration::from_vec(vec![0.0]));

        assert_relative_eq!(j[(0, 0)], 0.0, epsilon = 1e-6);
        assert_relative_eq!(j[(1, 0)], 2.0, epsilon = 1e-6);
        assert_relative_eq!(j[(5, 0)], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_twist_resolution_respects_limits() {
        let arm = PlanarArm::new(vec![1.0, 1.0, 0.5]);
        let q = Configuration::from_vec(vec![0.3, 0.6, -0.4]);
        let twist = Vector6::new(0.1, 0.0, 0.0, 0.0, 0.0, 0.0);

        let dq = joint_velocity_from_twist(&arm, &q, &twist, None).unwrap();
        let realised = jacobian(&arm, &q) * &dq;
        assert_relative_eq!(realised[0], 0.1, epsilon = 1e-5);
        assert_relative_eq!(realised[1], 0.0, epsilon = 1e-5);
        assert_relative_eq!(realised[5], 0.0, epsilon = 1e-5);

        let limits = Configuration::from_element(3, 1e-3);
        let slow = joint_velocity_from_twist(&arm, &q, &twist, Some(&limits)).unwrap();
        assert!(slow.iter().all(|v| v.abs() <= 1e-3 + 1e-12));
    }
}
