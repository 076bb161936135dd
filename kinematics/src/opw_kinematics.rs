use nalgebra::Isometry3;
use rs_opw_kinematics::kinematic_traits::Kinematics;
use rs_opw_kinematics::kinematics_impl::OPWKinematics;
use rs_opw_kinematics::parameters::opw_kinematics::Parameters;

use crate::{Configuration, ForwardKinematics, InverseKinematics};

/// Six-axis industrial arm with an ortho-parallel wrist.
pub struct OpwKinematicsSolver {
    parameters: Parameters,
}

impl OpwKinematicsSolver {
    pub fn new(c1: f64, c2: f64, c3: f64, c4: f64, a1: f64, a2: f64, b: f64) -> Self {
        let parameters = Parameters {
            c1, c2, c3, c4, a1, a2, b,
            offsets: [0.0; 6],
            sign_corrections: [1; 6],
            dof: 6,
        };
        Self { parameters }
    }

    fn joints(q: &Configuration) -> [f64; 6] {
        let mut joints = [0.0; 6];
        for (joint, value) in joints.iter_mut().zip(q.iter()) {
            *joint = *value;
        }
        joints
    }

    /// Whether forward kinematics of `solution` lands on `target_pose`.
    pub fn verify_solution(&self, target_pose: &Isometry3<f64>, solution: &Configuration) -> bool {
        let fk_pose = self.forward_kinematics(solution);
        let translation_diff = (target_pose.translation.vector - fk_pose.translation.vector).norm();
        let rotation_diff = target_pose.rotation.angle_to(&fk_pose.rotation);

        translation_diff < 1e-4 && rotation_diff < 1e-4
    }
}

impl ForwardKinematics for OpwKinematicsSolver {
    fn dof(&self) -> usize {
        6
    }

    fn forward_kinematics(&self, joints: &Configuration) -> Isometry3<f64> {
        let solver = OPWKinematics::new(self.parameters);
        solver.forward(&Self::joints(joints))
    }
}

impl InverseKinematics for OpwKinematicsSolver {
    fn inverse_kinematics(&self, pose: &Isometry3<f64>) -> Vec<Configuration> {
        let solver = OPWKinematics::new(self.parameters);
        solver
            .inverse(pose)
            .into_iter()
            .filter(|solution| solution.iter().all(|value| value.is_finite()))
            .map(|solution| Configuration::from_row_slice(&solution))
            .collect()
    }
}
