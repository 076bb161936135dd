//! Post-processing of planner output into trajectories ready to execute.

use kinematics::{Configuration, Robot};
use log::{debug, warn};
use planner::{PlanningError, Trajectory, Waypoint, tags};
use serde::{Deserialize, Serialize};

/// Overrides for pipeline selection. Unset fields are read from the
/// trajectory's tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessOptions {
    pub constrained: Option<bool>,
    pub smooth: Option<bool>,
    /// Largest joint-space deviation of a waypoint from the line through
    /// its neighbours for it to be dropped as redundant.
    pub simplify_tolerance: f64,
}

impl Default for PostProcessOptions {
    fn default() -> Self {
        Self {
            constrained: None,
            smooth: None,
            simplify_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostProcessPipeline {
    /// Keep every waypoint and retime, stopping at each one.
    Constrained,
    /// Fit a smooth timing through the waypoints. Not available yet;
    /// behaves as `Default`.
    Smooth,
    /// Free to change the geometric path before retiming.
    Default,
}

impl PostProcessPipeline {
    pub fn select(trajectory: &Trajectory, options: &PostProcessOptions) -> Self {
        let constrained = options
            .constrained
            .unwrap_or_else(|| trajectory.flag(tags::CONSTRAINED));
        let smooth = options.smooth.unwrap_or_else(|| trajectory.flag(tags::SMOOTH));

        let pipeline = if constrained {
            Self::Constrained
        } else if smooth {
            Self::Smooth
        } else {
            Self::Default
        };
        debug!("constrained = {constrained}, smooth = {smooth}: {pipeline:?} pipeline");
        pipeline
    }

    pub fn apply(
        self,
        robot: &Robot,
        trajectory: &Trajectory,
        options: &PostProcessOptions,
    ) -> Result<Trajectory, PlanningError> {
        validate(robot, trajectory)?;

        match self {
            Self::Constrained => Ok(retime(robot, trajectory)),
            Self::Smooth => {
                warn!(
                    "Post-processing smooth paths is not supported. Using the default \
                     post-processing logic; this may change the geometric path."
                );
                Self::Default.apply(robot, trajectory, options)
            }
            Self::Default => {
                let simplified = simplify(trajectory, options.simplify_tolerance);
                debug!(
                    "dropped {} redundant waypoints",
                    trajectory.len() - simplified.len()
                );
                Ok(retime(robot, &simplified))
            }
        }
    }
}

fn validate(robot: &Robot, trajectory: &Trajectory) -> Result<(), PlanningError> {
    if trajectory.is_empty() {
        return Err(PlanningError::invalid_argument("cannot post-process an empty trajectory"));
    }
    if let Some(waypoint) = trajectory
        .waypoints()
        .iter()
        .find(|waypoint| waypoint.configuration.len() != robot.dof())
    {
        return Err(PlanningError::invalid_argument(format!(
            "trajectory has {} DOF, robot \"{}\" has {}",
            waypoint.configuration.len(),
            robot.name(),
            robot.dof()
        )));
    }
    Ok(())
}

/// Times every segment so the slowest joint moves at its velocity limit.
/// Waypoints that do not move are dropped.
pub fn retime(robot: &Robot, trajectory: &Trajectory) -> Trajectory {
    let limits = robot.velocity_limits();
    let mut waypoints: Vec<Waypoint> = Vec::with_capacity(trajectory.len());

    for waypoint in trajectory.waypoints() {
        let Some(previous) = waypoints.last() else {
            waypoints.push(Waypoint::new(0.0, waypoint.configuration.clone()));
            continue;
        };

        let delta_time = segment_time(&previous.configuration, &waypoint.configuration, limits);
        if delta_time > 0.0 {
            waypoints.push(Waypoint::new(delta_time, waypoint.configuration.clone()));
        }
    }

    let mut timed = Trajectory::new(waypoints);
    for (key, value) in trajectory.tags() {
        timed.set_tag(key.clone(), value.clone());
    }
    timed.with_tag(tags::TIMED, true)
}

fn segment_time(from: &Configuration, to: &Configuration, limits: &Configuration) -> f64 {
    from.iter()
        .zip(to.iter())
        .zip(limits.iter())
        .map(|((a, b), limit)| (b - a).abs() / limit)
        .fold(0.0, f64::max)
}

/// Drops interior waypoints lying within `tolerance` of the segment joining
/// the last kept waypoint and the next one.
fn simplify(trajectory: &Trajectory, tolerance: f64) -> Trajectory {
    let input = trajectory.waypoints();
    let mut kept: Vec<Waypoint> = Vec::with_capacity(input.len());

    for (index, waypoint) in input.iter().enumerate() {
        let next = input.get(index + 1);
        let redundant = match (kept.last(), next) {
            (Some(previous), Some(next)) => {
                deviation(&previous.configuration, &waypoint.configuration, &next.configuration)
                    <= tolerance
            }
            _ => false,
        };
        if !redundant {
            kept.push(waypoint.clone());
        }
    }

    let mut simplified = Trajectory::new(kept);
    for (key, value) in trajectory.tags() {
        simplified.set_tag(key.clone(), value.clone());
    }
    simplified
}

fn deviation(start: &Configuration, point: &Configuration, end: &Configuration) -> f64 {
    let span = end - start;
    let offset = point - start;
    let length_squared = span.norm_squared();
    if length_squared == 0.0 {
        return offset.norm();
    }
    let along = (offset.dot(&span) / length_squared).clamp(0.0, 1.0);
    (offset - span * along).norm()
}

/// Whether any segment moves a joint faster than its velocity limit.
pub fn violates_velocity_limits(robot: &Robot, trajectory: &Trajectory) -> bool {
    let limits = robot.velocity_limits();

    trajectory.waypoints().windows(2).enumerate().any(|(index, pair)| {
        let required = segment_time(&pair[0].configuration, &pair[1].configuration, limits);
        let violates = required > pair[1].delta_time * (1.0 + 1e-9);
        if violates {
            warn!(
                "Velocity for waypoint {} violates limits (needs {required:.3}s, has {:.3}s)",
                index + 1,
                pair[1].delta_time
            );
        }
        violates
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kinematics::{CartesianGantry, DofLimits};
    use std::sync::Arc;

    fn gantry() -> Robot {
        let limits = DofLimits::uniform(2, -10.0, 10.0).unwrap();
        Robot::new("gantry", Arc::new(CartesianGantry::new(2).unwrap()), limits)
            .unwrap()
            .with_velocity_limits(Configuration::from_vec(vec![1.0, 0.5]))
            .unwrap()
    }

    fn path(points: &[[f64; 2]]) -> Trajectory {
        Trajectory::new(
            points
                .iter()
                .map(|p| Waypoint::new(0.0, Configuration::from_vec(p.to_vec())))
                .collect(),
        )
    }

    #[test]
    fn test_selection_follows_tags_and_overrides() {
        let constrained = path(&[[0.0, 0.0]])
            .with_tag(tags::CONSTRAINED, true)
            .with_tag(tags::SMOOTH, true);
        let smooth = path(&[[0.0, 0.0]]).with_tag(tags::SMOOTH, true);
        let options = PostProcessOptions::default();

        assert_eq!(PostProcessPipeline::select(&constrained, &options), PostProcessPipeline::Constrained);
        assert_eq!(PostProcessPipeline::select(&smooth, &options), PostProcessPipeline::Smooth);
        assert_eq!(PostProcessPipeline::select(&path(&[[0.0, 0.0]]), &options), PostProcessPipeline::Default);

        let forced = PostProcessOptions {
            constrained: Some(false),
            smooth: Some(false),
            ..Default::default()
        };
        assert_eq!(PostProcessPipeline::select(&constrained, &forced), PostProcessPipeline::Default);
    }

    #[test]
    fn test_retime_uses_slowest_joint() {
        let robot = gantry();
        let timed = retime(&robot, &path(&[[0.0, 0.0], [1.0, 1.0], [1.0, 1.0], [1.5, 1.0]]));

        assert_eq!(timed.len(), 3);
        assert_relative_eq!(timed.waypoints()[1].delta_time, 2.0);
        assert_relative_eq!(timed.waypoints()[2].delta_time, 0.5);
        assert!(timed.flag(tags::TIMED));
        assert!(!violates_velocity_limits(&robot, &timed));
    }

    #[test]
    fn test_default_pipeline_drops_collinear_waypoints() {
        let robot = gantry();
        let input = path(&[[0.0, 0.0], [0.5, 0.5], [1.0, 1.0], [1.0, 2.0]]);
        let output = PostProcessPipeline::Default
            .apply(&robot, &input, &PostProcessOptions::default())
            .unwrap();

        assert_eq!(output.len(), 3);
        assert_eq!(output.waypoints()[1].configuration, Configuration::from_vec(vec![1.0, 1.0]));
    }

    #[test]
    fn test_constrained_pipeline_keeps_every_waypoint() {
        let robot = gantry();
        let input = path(&[[0.0, 0.0], [0.5, 0.5], [1.0, 1.0]]).with_tag(tags::CONSTRAINED, true);
        let output = PostProcessPipeline::Constrained
            .apply(&robot, &input, &PostProcessOptions::default())
            .unwrap();

        assert_eq!(output.len(), 3);
        assert!(output.flag(tags::CONSTRAINED));
    }

    #[test]
    fn test_rejects_mismatched_trajectory() {
        let robot = gantry();
        let input = Trajectory::new(vec![Waypoint::new(0.0, Configuration::from_vec(vec![0.0]))]);
        let result = PostProcessPipeline::Default.apply(&robot, &input, &PostProcessOptions::default());
        assert!(matches!(result, Err(PlanningError::InvalidArgument(_))));
    }

    #[test]
    fn test_untimed_path_violates_limits() {
        let robot = gantry();
        assert!(violates_velocity_limits(&robot, &path(&[[0.0, 0.0], [0.1, 0.0]])));
        assert!(!violates_velocity_limits(&robot, &path(&[[0.0, 0.0]])));
    }
}
