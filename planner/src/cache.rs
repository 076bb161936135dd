//! Raw integration path, the cache pointer, and conversion of both into
//! the output trajectory.

use kinematics::Configuration;
use log::debug;

use crate::ode::ContinuousSolution;
use crate::trajectory::{Trajectory, Waypoint, tags};

/// Append-only record of accepted solver steps.
#[derive(Debug, Clone)]
pub struct RawPath {
    waypoints: Vec<Waypoint>,
    times: Vec<f64>,
}

impl RawPath {
    pub fn new(initial: Configuration) -> Self {
        Self {
            waypoints: vec![Waypoint::new(0.0, initial)],
            times: vec![0.0],
        }
    }

    /// Appends a waypoint at cumulative time `t`, which must be later than
    /// the current end of the path.
    pub fn push(&mut self, t: f64, configuration: Configuration) {
        let duration = self.duration();
        debug_assert!(t > duration, "raw path time went backwards");
        self.waypoints.push(Waypoint::new(t - duration, configuration));
        self.times.push(t);
    }

    pub fn duration(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Index of the first waypoint at or after `t`.
    pub fn first_index_at_or_after(&self, t: f64) -> usize {
        self.times.partition_point(|time| *time < t)
    }
}

/// Latest time confirmed as valid output by the termination predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CachePointer(Option<f64>);

impl CachePointer {
    pub fn get(&self) -> Option<f64> {
        self.0
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Moves the pointer to `t`. The pointer never moves backwards.
    pub fn record(&mut self, t: f64) {
        debug_assert!(self.0.is_none_or(|cached| t >= cached));
        let t = self.0.map_or(t, |cached| cached.max(t));
        debug!("caching trajectory up to t = {t:.4}");
        self.0 = Some(t);
    }
}

/// Builds the output trajectory from every raw waypoint strictly before
/// `t_cache`, closed by the continuous solution sampled exactly at `t_cache`.
pub fn truncate(path: &RawPath, solution: &ContinuousSolution, t_cache: f64) -> Trajectory {
    let keep = path.first_index_at_or_after(t_cache);
    let mut waypoints = path.waypoints()[..keep].to_vec();

    let delta_time = match keep {
        0 => 0.0,
        _ => t_cache - path.times[keep - 1],
    };
    waypoints.push(Waypoint::new(delta_time, solution.sample(t_cache)));

    Trajectory::new(waypoints)
        .with_tag(tags::CONSTRAINED, true)
        .with_tag(tags::SMOOTH, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ode::StepInterpolant;
    use approx::assert_relative_eq;

    fn q(value: f64) -> Configuration {
        Configuration::from_vec(vec![value])
    }

    /// Unit-speed motion sampled by steps ending at 1, 2 and 4.
    fn unit_motion() -> (RawPath, ContinuousSolution) {
        let mut path = RawPath::new(q(0.0));
        let mut solution = ContinuousSolution::new(q(0.0));
        let mut start = 0.0;
        for end in [1.0, 2.0, 4.0] {
            solution.push(StepInterpolant::new((start, q(start), q(1.0)), (end, q(end), q(1.0))));
            path.push(end, q(end));
            start = end;
        }
        (path, solution)
    }

    #[test]
    fn test_truncates_inside_a_step() {
        let (path, solution) = unit_motion();
        let trajectory = truncate(&path, &solution, 2.5);

        assert_eq!(trajectory.len(), 4);
        assert_eq!(trajectory.times(), vec![0.0, 1.0, 2.0, 2.5]);
        assert_relative_eq!(trajectory.last().unwrap().configuration[0], 2.5, epsilon = 1e-12);
        assert!(trajectory.flag(tags::CONSTRAINED));
        assert!(trajectory.flag(tags::SMOOTH));
    }

    #[test]
    fn test_cache_on_a_waypoint_replaces_it() {
        let (path, solution) = unit_motion();
        let trajectory = truncate(&path, &solution, 2.0);

        assert_eq!(trajectory.times(), vec![0.0, 1.0, 2.0]);
        assert_eq!(trajectory.len(), 3);
    }

    #[test]
    fn test_cache_at_start_yields_single_waypoint() {
        let (path, solution) = unit_motion();
        let trajectory = truncate(&path, &solution, 0.0);

        assert_eq!(trajectory.len(), 1);
        assert_eq!(trajectory.first().unwrap().delta_time, 0.0);
        assert_eq!(trajectory.first().unwrap().configuration[0], 0.0);
    }

    #[test]
    fn test_cache_beyond_recorded_path_uses_solution() {
        let mut path = RawPath::new(q(0.0));
        let mut solution = ContinuousSolution::new(q(0.0));
        path.push(1.0, q(1.0));
        solution.push(StepInterpolant::new((0.0, q(0.0), q(1.0)), (1.0, q(1.0), q(1.0))));
        // A step that failed its checks part way is in the solution only.
        solution.push(StepInterpolant::new((1.0, q(1.0), q(1.0)), (3.0, q(3.0), q(1.0))));

        let trajectory = truncate(&path, &solution, 1.75);
        assert_eq!(trajectory.times(), vec![0.0, 1.0, 1.75]);
        assert_relative_eq!(trajectory.last().unwrap().configuration[0], 1.75, epsilon = 1e-12);
    }

    #[test]
    fn test_cache_pointer_is_monotonic() {
        let mut cache = CachePointer::default();
        assert!(!cache.is_set());
        cache.record(0.5);
        cache.record(1.5);
        assert_eq!(cache.get(), Some(1.5));
    }
}
