//! Integration of joint-space velocity fields under constraint monitoring.

use std::time::{Duration, Instant};

use kinematics::twist::{geodesic_distance, geodesic_error, geodesic_twist, joint_velocity_from_twist};
use kinematics::{CollisionChecker, Configuration, Robot};
use log::{debug, info, warn};
use nalgebra::{Isometry3, Vector3};

use crate::cache::{CachePointer, RawPath, truncate};
use crate::config::{FollowOptions, OffsetOptions, PoseOptions};
use crate::context::PlanningContext;
use crate::discretize::CheckResolution;
use crate::error::{Fault, PlanningError, Result};
use crate::monitor::ConstraintMonitor;
use crate::ode::{ContinuousSolution, DormandPrince, OdeSystem, StepControl, StepInterpolant};
use crate::status::Status;
use crate::trajectory::{Trajectory, tags};

/// State owned by one `follow_vector_field` call.
struct IntegrationSession<'a, F, P> {
    robot: &'a mut Robot,
    environment: &'a dyn CollisionChecker,
    field: F,
    predicate: P,
    path: RawPath,
    solution: ContinuousSolution,
    cache: CachePointer,
    pending: Option<Fault>,
    resolution: CheckResolution,
    started: Instant,
    time_limit: Duration,
}

impl<F, P> IntegrationSession<'_, F, P>
where
    F: FnMut(&PlanningContext<'_>) -> std::result::Result<Configuration, Fault>,
    P: FnMut(&PlanningContext<'_>) -> std::result::Result<Status, Fault>,
{
    fn process_sample(&mut self, t: f64, q: &Configuration) -> StepControl {
        let elapsed = self.started.elapsed();
        if elapsed >= self.time_limit {
            return self.halt(Fault::TimeLimitExceeded {
                elapsed: elapsed.as_secs_f64(),
                limit: self.time_limit.as_secs_f64(),
            });
        }

        let monitor = ConstraintMonitor::new(self.environment);
        match monitor.evaluate(self.robot, t, q, &mut self.predicate) {
            Ok(status) => {
                if status.does_cache() {
                    self.cache.record(t);
                }
                if status.does_terminate() {
                    self.halt(Fault::UserTerminated)
                } else {
                    StepControl::Continue
                }
            }
            Err(fault) => self.halt(fault),
        }
    }

    fn halt(&mut self, fault: Fault) -> StepControl {
        debug!("halting integration: {fault}");
        self.pending = Some(fault);
        StepControl::Stop
    }

    fn finish(self) -> Result<Trajectory> {
        let Some(t_cache) = self.cache.get() else {
            return Err(self
                .pending
                .unwrap_or_else(|| Fault::integrator("integration ended without caching a valid prefix"))
                .into());
        };

        if let Some(fault) = self.pending.filter(|fault| *fault != Fault::UserTerminated) {
            warn!("Terminated early: {fault}");
        }
        Ok(truncate(&self.path, &self.solution, t_cache))
    }
}

impl<F, P> OdeSystem for IntegrationSession<'_, F, P>
where
    F: FnMut(&PlanningContext<'_>) -> std::result::Result<Configuration, Fault>,
    P: FnMut(&PlanningContext<'_>) -> std::result::Result<Status, Fault>,
{
    fn velocity(&mut self, t: f64, y: &Configuration) -> std::result::Result<Configuration, Fault> {
        (self.field)(&PlanningContext::new(t, y, &*self.robot, self.environment))
    }

    fn on_step(&mut self, step: &StepInterpolant) -> StepControl {
        self.solution.push(step.clone());

        for (t, q) in self.resolution.samples(step) {
            if self.process_sample(t, &q) == StepControl::Stop {
                return StepControl::Stop;
            }
        }

        self.path.push(step.t1(), step.end().clone());
        StepControl::Continue
    }
}

/// Follows `field` from the robot's current configuration until the
/// predicate terminates, a constraint breaks, or a time limit is hit.
///
/// Returns the prefix up to the last sample the predicate cached. Faults
/// after a cached sample are logged and the prefix is still returned;
/// solver failures are always returned as errors. Faults the field returns
/// are treated like predicate faults unless they are solver failures. On return the robot is
/// left at the last configuration that passed the limit check.
pub fn follow_vector_field<F, P>(
    robot: &mut Robot,
    environment: &dyn CollisionChecker,
    field: F,
    predicate: P,
    options: &FollowOptions,
) -> Result<Trajectory>
where
    F: FnMut(&PlanningContext<'_>) -> std::result::Result<Configuration, Fault>,
    P: FnMut(&PlanningContext<'_>) -> std::result::Result<Status, Fault>,
{
    options.validate()?;

    let initial = robot.configuration().clone();
    let resolution = CheckResolution::new(robot.resolutions().clone(), options.resolution_multiplier);
    let mut session = IntegrationSession {
        robot,
        environment,
        field,
        predicate,
        path: RawPath::new(initial.clone()),
        solution: ContinuousSolution::new(initial.clone()),
        cache: CachePointer::default(),
        pending: None,
        resolution,
        started: Instant::now(),
        time_limit: options.time_limit,
    };

    if session.process_sample(0.0, &initial) == StepControl::Continue {
        let solver = DormandPrince {
            first_step: options.first_step,
            atol: options.atol,
            rtol: options.rtol,
            max_steps: options.max_steps,
        };
        match solver.integrate(&mut session, initial, options.integration_time_limit) {
            Ok(exit) => debug!(
                "solver exited {exit:?} at t = {:.4} after {} accepted steps",
                session.solution.end_time(),
                session.path.len() - 1
            ),
            Err(fault) if fault.is_fatal() => return Err(fault.into()),
            // A non-solver fault raised by the field itself.
            Err(fault) => {
                session.halt(fault);
            }
        }
    }

    let trajectory = session.finish()?;
    info!(
        "followed vector field for {:.3}s of trajectory time ({} waypoints)",
        trajectory.duration(),
        trajectory.len()
    );
    Ok(trajectory)
}

/// End-effector planners built on [`follow_vector_field`].
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorFieldPlanner;

impl VectorFieldPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn follow_vector_field<F, P>(
        &self,
        robot: &mut Robot,
        environment: &dyn CollisionChecker,
        field: F,
        predicate: P,
        options: &FollowOptions,
    ) -> Result<Trajectory>
    where
        F: FnMut(&PlanningContext<'_>) -> std::result::Result<Configuration, Fault>,
        P: FnMut(&PlanningContext<'_>) -> std::result::Result<Status, Fault>,
    {
        follow_vector_field(robot, environment, field, predicate, options)
    }

    /// Moves the end effector in a straight line along `direction`, keeping
    /// its starting orientation. Motions shorter than `options.distance`
    /// fail; the motion never exceeds `options.max_distance`.
    pub fn plan_to_end_effector_offset(
        &self,
        robot: &mut Robot,
        environment: &dyn CollisionChecker,
        direction: &Vector3<f64>,
        options: &OffsetOptions,
    ) -> Result<Trajectory> {
        options.validate()?;
        let norm = direction.norm();
        if !(norm > 0.0 && norm.is_finite()) {
            return Err(PlanningError::invalid_argument("direction must be non-zero"));
        }
        let direction = direction / norm;
        let start = robot.end_effector_transform();

        let field = |ctx: &PlanningContext<'_>| -> std::result::Result<Configuration, Fault> {
            let mut twist = geodesic_twist(&ctx.end_effector_transform(), &start);
            twist.fixed_rows_mut::<3>(0).copy_from(&direction);
            joint_velocity_from_twist(ctx.robot().kinematics(), ctx.configuration(), &twist, None)
                .map_err(|e| Fault::integrator(e.to_string()))
        };

        let predicate = |ctx: &PlanningContext<'_>| -> std::result::Result<Status, Fault> {
            let error = geodesic_error(&start, &ctx.end_effector_transform());
            if error.w.abs() > options.angular_tolerance {
                return Err(Fault::constraint("deviated from orientation constraint"));
            }

            let translation = error.xyz();
            let moved = translation.dot(&direction);
            if (translation - direction * moved).norm() > options.position_tolerance {
                return Err(Fault::constraint("deviated from straight line constraint"));
            }

            Ok(match options.max_distance {
                None if moved > options.distance => Status::CacheAndTerminate,
                Some(max_distance) if moved > max_distance => Status::Terminate,
                Some(_) if moved >= options.distance => Status::CacheAndContinue,
                _ => Status::Continue,
            })
        };

        follow_vector_field(robot, environment, field, predicate, &options.follow)
    }

    /// Follows the geodesic twist towards `goal` at the fastest speed the
    /// joint velocity limits allow.
    pub fn plan_to_end_effector_pose(
        &self,
        robot: &mut Robot,
        environment: &dyn CollisionChecker,
        goal: &Isometry3<f64>,
        options: &PoseOptions,
    ) -> Result<Trajectory> {
        options.validate()?;

        let field = |ctx: &PlanningContext<'_>| -> std::result::Result<Configuration, Fault> {
            let twist = geodesic_twist(&ctx.end_effector_transform(), goal);
            let dq = joint_velocity_from_twist(ctx.robot().kinematics(), ctx.configuration(), &twist, None)
                .map_err(|e| Fault::integrator(e.to_string()))?;

            let scale = dq
                .iter()
                .zip(ctx.robot().velocity_limits().iter())
                .filter(|(v, _)| **v != 0.0)
                .map(|(v, limit)| (limit / v).abs())
                .fold(f64::INFINITY, f64::min);

            Ok(if scale.is_finite() { dq * scale } else { dq })
        };

        let predicate = |ctx: &PlanningContext<'_>| -> std::result::Result<Status, Fault> {
            if geodesic_distance(&ctx.end_effector_transform(), goal) < options.pose_error_tolerance {
                Ok(Status::CacheAndTerminate)
            } else {
                Ok(Status::Continue)
            }
        };

        let trajectory = follow_vector_field(robot, environment, field, predicate, &options.follow)?;
        Ok(trajectory.with_tag(tags::CONSTRAINED, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinematics::{CartesianGantry, DofLimits, Environment};
    use std::sync::Arc;

    fn gantry() -> Robot {
        let limits = DofLimits::uniform(1, 0.0, 10.0).unwrap();
        Robot::new("gantry", Arc::new(CartesianGantry::new(1).unwrap()), limits).unwrap()
    }

    fn unit_speed(_: &PlanningContext<'_>) -> std::result::Result<Configuration, Fault> {
        Ok(Configuration::from_vec(vec![1.0]))
    }

    #[test]
    fn test_field_sees_candidate_without_commit() {
        let mut robot = gantry();
        let environment = Environment::new();
        let mut probes = Vec::new();

        let field = |ctx: &PlanningContext<'_>| {
            probes.push((ctx.configuration()[0], ctx.robot().configuration()[0]));
            Ok(Configuration::from_vec(vec![1.0]))
        };
        let predicate = |ctx: &PlanningContext<'_>| {
            Ok(if ctx.configuration()[0] >= 1.0 {
                Status::CacheAndTerminate
            } else {
                Status::Continue
            })
        };
        follow_vector_field(&mut robot, &environment, field, predicate, &FollowOptions::default()).unwrap();

        // Stage evaluations probe ahead of the committed state.
        assert!(probes.iter().any(|(candidate, committed)| candidate > committed));
    }

    #[test]
    fn test_invalid_options_rejected_before_integration() {
        let mut robot = gantry();
        let environment = Environment::new();
        let options = FollowOptions {
            first_step: 0.0,
            ..Default::default()
        };
        let mut calls = 0;
        let predicate = |_: &PlanningContext<'_>| {
            calls += 1;
            Ok(Status::CacheAndTerminate)
        };

        let result = follow_vector_field(&mut robot, &environment, unit_speed, predicate, &options);
        assert!(matches!(result, Err(PlanningError::InvalidArgument(_))));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_integration_time_limit_without_cache_fails() {
        let mut robot = gantry();
        let environment = Environment::new();
        let options = FollowOptions::default().with_integration_time_limit(0.5);

        let result = follow_vector_field(
            &mut robot,
            &environment,
            unit_speed,
            |_: &PlanningContext<'_>| Ok(Status::Continue),
            &options,
        );
        assert!(matches!(
            result,
            Err(PlanningError::Fault(Fault::IntegratorFailure(_)))
        ));
    }

    #[test]
    fn test_reaching_integration_time_limit_returns_cached_path() {
        let mut robot = gantry();
        let environment = Environment::new();
        let options = FollowOptions::default().with_integration_time_limit(0.5);

        let trajectory = follow_vector_field(
            &mut robot,
            &environment,
            unit_speed,
            |_: &PlanningContext<'_>| Ok(Status::CacheAndContinue),
            &options,
        )
        .unwrap();

        assert!((trajectory.duration() - 0.5).abs() < 1e-9);
        assert!((trajectory.last().unwrap().configuration[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_offset_rejects_zero_direction() {
        let mut robot = gantry();
        let environment = Environment::new();
        let result = VectorFieldPlanner::new().plan_to_end_effector_offset(
            &mut robot,
            &environment,
            &Vector3::zeros(),
            &OffsetOptions::new(0.1),
        );
        assert_eq!(
            result.unwrap_err(),
            PlanningError::invalid_argument("direction must be non-zero")
        );
    }
}
