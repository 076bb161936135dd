use kinematics::{CollisionChecker, Configuration, Robot};
use log::trace;

use crate::context::PlanningContext;
use crate::error::Fault;
use crate::status::Status;

/// Per-sample feasibility check: position limits, then environment and self
/// collision, then the caller's termination predicate.
///
/// Passing samples are committed to the robot, so two monitors must never
/// run against the same `Robot` at once.
pub struct ConstraintMonitor<'a> {
    checker: &'a dyn CollisionChecker,
}

impl<'a> ConstraintMonitor<'a> {
    pub fn new(checker: &'a dyn CollisionChecker) -> Self {
        Self { checker }
    }

    /// Checks limits before committing `q`, so an out-of-range configuration
    /// never reaches the robot, then runs both collision queries.
    pub fn check(&self, robot: &mut Robot, q: &Configuration) -> Result<(), Fault> {
        if let Some(violation) = robot.position_limits().first_violation(q) {
            return Err(Fault::PositionLimitViolation {
                dof: violation.dof,
                value: violation.value,
                limit: violation.limit,
                bound: violation.bound,
            });
        }

        robot
            .set_configuration(q)
            .map_err(|e| Fault::integrator(e.to_string()))?;

        if let Some(report) = self.checker.check_environment_collision(robot) {
            return Err(Fault::Collision(report));
        }
        if let Some(report) = self.checker.check_self_collision(robot) {
            return Err(Fault::SelfCollision(report));
        }
        Ok(())
    }

    /// Full evaluation of one sample, ending with the termination predicate.
    pub fn evaluate<P>(
        &self,
        robot: &mut Robot,
        time: f64,
        q: &Configuration,
        predicate: &mut P,
    ) -> Result<Status, Fault>
    where
        P: FnMut(&PlanningContext<'_>) -> Result<Status, Fault>,
    {
        self.check(robot, q)?;

        let robot: &Robot = robot;
        let status = predicate(&PlanningContext::new(
            time,
            robot.configuration(),
            robot,
            self.checker,
        ))?;
        trace!("t = {time:.4}: {status:?}");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinematics::{Bound, CartesianGantry, DofLimits, Environment, Obstacle, PlanarArm};
    use nalgebra::Point3;
    use std::f64::consts::PI;
    use std::sync::Arc;

    fn gantry() -> Robot {
        let limits = DofLimits::uniform(1, 0.0, 10.0).unwrap();
        Robot::new("gantry", Arc::new(CartesianGantry::new(1).unwrap()), limits)
            .unwrap()
            .with_link_radius(0.1)
    }

    fn obstacle_at(x: f64) -> Environment {
        Environment::new().with_obstacle(Obstacle::sphere("block", Point3::new(x, 0.0, 0.0), 1.0))
    }

    #[test]
    fn test_limit_violation_wins_and_is_never_committed() {
        let mut robot = gantry()
            .with_configuration(Configuration::from_vec(vec![1.0]))
            .unwrap();
        let environment = obstacle_at(11.0);
        let monitor = ConstraintMonitor::new(&environment);

        let fault = monitor
            .check(&mut robot, &Configuration::from_vec(vec![11.0]))
            .unwrap_err();

        assert_eq!(
            fault,
            Fault::PositionLimitViolation {
                dof: 0,
                value: 11.0,
                limit: 10.0,
                bound: Bound::Upper,
            }
        );
        assert_eq!(robot.configuration()[0], 1.0);
    }

    #[test]
    fn test_collision_commits_then_reports() {
        let mut robot = gantry();
        let environment = obstacle_at(5.0);
        let monitor = ConstraintMonitor::new(&environment);

        let fault = monitor
            .check(&mut robot, &Configuration::from_vec(vec![4.5]))
            .unwrap_err();

        assert!(matches!(fault, Fault::Collision(ref report) if report.other == "block"));
        assert_eq!(robot.configuration()[0], 4.5);
    }

    #[test]
    fn test_environment_checked_before_self_collision() {
        let limits = DofLimits::uniform(3, -PI, PI).unwrap();
        let mut robot = Robot::new("arm", Arc::new(PlanarArm::new(vec![1.0, 1.0, 1.0])), limits)
            .unwrap()
            .with_link_radius(0.05);
        let folded = Configuration::from_vec(vec![0.0, PI, 0.0]);

        let empty = Environment::new();
        let fault = ConstraintMonitor::new(&empty).check(&mut robot, &folded).unwrap_err();
        assert!(matches!(fault, Fault::SelfCollision(_)));

        let cluttered = Environment::new()
            .with_obstacle(Obstacle::sphere("ball", Point3::new(-0.5, 0.0, 0.0), 0.1));
        let fault = ConstraintMonitor::new(&cluttered).check(&mut robot, &folded).unwrap_err();
        assert!(matches!(fault, Fault::Collision(_)));
    }

    #[test]
    fn test_predicate_sees_committed_sample() {
        let mut robot = gantry();
        let environment = Environment::new();
        let monitor = ConstraintMonitor::new(&environment);
        let mut seen = Vec::new();
        let mut predicate = |ctx: &PlanningContext<'_>| {
            seen.push((ctx.time(), ctx.robot().configuration()[0], ctx.configuration()[0]));
            Ok(Status::CacheAndContinue)
        };

        let status = monitor
            .evaluate(&mut robot, 0.25, &Configuration::from_vec(vec![2.0]), &mut predicate)
            .unwrap();

        assert_eq!(status, Status::CacheAndContinue);
        assert_eq!(seen, vec![(0.25, 2.0, 2.0)]);
    }

    #[test]
    fn test_predicate_not_called_on_fault() {
        let mut robot = gantry();
        let environment = obstacle_at(3.0);
        let monitor = ConstraintMonitor::new(&environment);
        let mut calls = 0;
        let mut predicate = |_: &PlanningContext<'_>| {
            calls += 1;
            Ok(Status::Continue)
        };

        let result = monitor.evaluate(&mut robot, 0.0, &Configuration::from_vec(vec![3.0]), &mut predicate);
        assert!(result.is_err());
        assert_eq!(calls, 0);
    }
}
