use kinematics::{CollisionChecker, Configuration, InverseKinematics, Robot};
use log::{debug, info};
use nalgebra::Isometry3;

use crate::config::SnapOptions;
use crate::discretize::CheckResolution;
use crate::error::{PlanningError, Result};
use crate::monitor::ConstraintMonitor;
use crate::ode::StepInterpolant;
use crate::trajectory::{Trajectory, Waypoint};

/// Plans a direct joint-space move to goals that are already close.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapPlanner;

impl SnapPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Two-waypoint straight line from the current configuration to `goal`.
    ///
    /// The segment is checked on a clone of `robot`, so the caller's robot
    /// is untouched whatever the outcome.
    pub fn plan_to_configuration(
        &self,
        robot: &Robot,
        environment: &dyn CollisionChecker,
        goal: &Configuration,
        options: &SnapOptions,
    ) -> Result<Trajectory> {
        let current = robot.configuration();
        if goal.len() != current.len() {
            return Err(PlanningError::invalid_argument(format!(
                "goal has {} DOF, robot has {}",
                goal.len(),
                current.len()
            )));
        }

        let distance = max_abs_distance(current, goal);
        if distance > options.snap_tolerance {
            return Err(PlanningError::SnapToleranceExceeded {
                distance,
                tolerance: options.snap_tolerance,
            });
        }

        let mut probe = robot.clone();
        let monitor = ConstraintMonitor::new(environment);
        let delta = goal - current;
        let segment = StepInterpolant::new(
            (0.0, current.clone(), delta.clone()),
            (1.0, goal.clone(), delta),
        );
        let resolution = CheckResolution::new(robot.resolutions().clone(), 1.0);
        for (_, q) in resolution.samples(&segment) {
            monitor.check(&mut probe, &q)?;
        }

        info!("snapping {} over {distance:.4}", robot.name());
        Ok(Trajectory::new(vec![
            Waypoint::new(0.0, current.clone()),
            Waypoint::new(0.0, goal.clone()),
        ]))
    }

    /// Snaps to the feasible IK solution at `pose` nearest the current
    /// configuration, measured by the largest per-DOF difference.
    pub fn plan_to_end_effector_pose(
        &self,
        robot: &Robot,
        environment: &dyn CollisionChecker,
        ik: &dyn InverseKinematics,
        pose: &Isometry3<f64>,
        options: &SnapOptions,
    ) -> Result<Trajectory> {
        let current = robot.configuration();
        let mut probe = robot.clone();

        let solutions = ik.inverse_kinematics(pose);
        debug!("{} IK solutions at the goal pose", solutions.len());

        let nearest = solutions
            .into_iter()
            .filter(|q| q.len() == current.len() && robot.position_limits().contains(q))
            .filter(|q| {
                probe.set_configuration(q).is_ok()
                    && environment.check_environment_collision(&probe).is_none()
            })
            .map(|q| (max_abs_distance(current, &q), q))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, q)| q)
            .ok_or(PlanningError::NoIkSolution)?;

        self.plan_to_configuration(robot, environment, &nearest, options)
    }
}

fn max_abs_distance(a: &Configuration, b: &Configuration) -> f64 {
    (a - b).amax()
}
