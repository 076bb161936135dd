use std::time::{Duration, Instant};

use kinematics::{JointState, Robot};
use log::info;
use planner::Trajectory;

use crate::error::{ExecutionError, Result};
use crate::pipeline::violates_velocity_limits;

/// Executes timed trajectories on a robot.
pub trait TrajectoryController: Send {
    /// Starts executing `trajectory`. Configurations the controller reaches
    /// are committed to `robot`.
    fn execute(&mut self, robot: &mut Robot, trajectory: &Trajectory) -> Result<()>;

    fn is_done(&self) -> bool;
}

/// Simulated controller that tracks trajectories perfectly.
///
/// Every waypoint is committed immediately; `is_done` turns true once the
/// trajectory duration, multiplied by `time_scale`, has elapsed.
#[derive(Debug, Clone)]
pub struct IdealController {
    time_scale: f64,
    finishes_at: Option<Instant>,
    feedback: Vec<JointState>,
}

impl Default for IdealController {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl IdealController {
    pub fn new(time_scale: f64) -> Self {
        Self {
            time_scale,
            finishes_at: None,
            feedback: Vec::new(),
        }
    }

    /// Joint states reported for the last commanded waypoint, with the
    /// velocity of the segment leading into it.
    pub fn feedback(&self) -> &[JointState] {
        &self.feedback
    }
}

impl TrajectoryController for IdealController {
    fn execute(&mut self, robot: &mut Robot, trajectory: &Trajectory) -> Result<()> {
        if violates_velocity_limits(robot, trajectory) {
            return Err(ExecutionError::controller("trajectory violates velocity limits"));
        }

        for waypoint in trajectory.waypoints() {
            robot
                .set_configuration(&waypoint.configuration)
                .map_err(|e| ExecutionError::controller(e.to_string()))?;
        }

        self.feedback = robot.joint_states();
        if let [.., previous, last] = trajectory.waypoints() {
            if last.delta_time > 0.0 {
                let velocity = (&last.configuration - &previous.configuration) / last.delta_time;
                for (state, v) in self.feedback.iter_mut().zip(velocity.iter()) {
                    state.velocity = *v;
                }
            }
        }

        let duration = Duration::try_from_secs_f64(trajectory.duration() * self.time_scale)
            .map_err(|e| ExecutionError::controller(e.to_string()))?;
        info!(
            "executing {} waypoints on \"{}\" over {:.3}s",
            trajectory.len(),
            robot.name(),
            duration.as_secs_f64()
        );
        self.finishes_at = Some(Instant::now() + duration);
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.finishes_at.is_none_or(|deadline| Instant::now() >= deadline)
    }
}

/// Polls `controller` every `period` until it is done. Without a timeout
/// this waits indefinitely.
pub async fn wait_for_completion<C>(controller: &C, timeout: Option<Duration>, period: Duration) -> Result<()>
where
    C: TrajectoryController + ?Sized,
{
    let started = tokio::time::Instant::now();
    while !controller.is_done() {
        check_timeout(started.elapsed(), timeout)?;
        tokio::time::sleep(period).await;
    }
    Ok(())
}

/// Blocking counterpart of [`wait_for_completion`] for stages running on
/// the blocking pool.
pub fn wait_for_completion_blocking<C>(controller: &C, timeout: Option<Duration>, period: Duration) -> Result<()>
where
    C: TrajectoryController + ?Sized,
{
    let started = Instant::now();
    while !controller.is_done() {
        check_timeout(started.elapsed(), timeout)?;
        std::thread::sleep(period);
    }
    Ok(())
}

fn check_timeout(elapsed: Duration, timeout: Option<Duration>) -> Result<()> {
    match timeout {
        Some(limit) if elapsed >= limit => Err(ExecutionError::Timeout(limit.as_secs_f64())),
        _ => Ok(()),
    }
}
