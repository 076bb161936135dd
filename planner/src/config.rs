//! Planner options. All of them deserialize from partial documents, with
//! missing fields taking their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowOptions {
    /// Ceiling on integrated time, in seconds of trajectory time.
    pub integration_time_limit: f64,
    /// Wall-clock budget for the whole call.
    #[serde(with = "seconds")]
    pub time_limit: Duration,
    /// Density of constraint checks relative to the robot's DOF resolutions.
    pub resolution_multiplier: f64,
    pub first_step: f64,
    pub atol: f64,
    pub rtol: f64,
    pub max_steps: usize,
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            integration_time_limit: 10.0,
            time_limit: Duration::from_secs(5),
            resolution_multiplier: 1.01,
            first_step: 0.1,
            atol: 1e-3,
            rtol: 1e-3,
            max_steps: 100_000,
        }
    }
}

impl FollowOptions {
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_integration_time_limit(mut self, limit: f64) -> Self {
        self.integration_time_limit = limit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.integration_time_limit > 0.0) {
            return Err(PlanningError::invalid_argument(
                "integration time limit must be positive",
            ));
        }
        if !(self.resolution_multiplier >= 1.0) {
            return Err(PlanningError::invalid_argument(
                "resolution multiplier must be at least 1",
            ));
        }
        if !(self.first_step > 0.0) {
            return Err(PlanningError::invalid_argument("first step must be positive"));
        }
        if !(self.atol > 0.0 && self.rtol >= 0.0) {
            return Err(PlanningError::invalid_argument(
                "absolute tolerance must be positive and relative tolerance non-negative",
            ));
        }
        if self.max_steps == 0 {
            return Err(PlanningError::invalid_argument("max steps must be non-zero"));
        }
        Ok(())
    }
}

/// Straight-line end-effector motion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetOptions {
    /// Minimum distance to travel, in metres. Shorter motions fail.
    pub distance: f64,
    /// The motion never travels further than this.
    pub max_distance: Option<f64>,
    pub position_tolerance: f64,
    pub angular_tolerance: f64,
    pub follow: FollowOptions,
}

impl Default for OffsetOptions {
    fn default() -> Self {
        Self {
            distance: 0.0,
            max_distance: None,
            position_tolerance: 0.01,
            angular_tolerance: 0.15,
            follow: FollowOptions::default(),
        }
    }
}

impl OffsetOptions {
    pub fn new(distance: f64) -> Self {
        Self {
            distance,
            ..Default::default()
        }
    }

    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.distance < 0.0 {
            return Err(PlanningError::invalid_argument("distance must be non-negative"));
        }
        if let Some(max_distance) = self.max_distance {
            if max_distance < self.distance {
                return Err(PlanningError::invalid_argument(
                    "max distance is less than minimum distance",
                ));
            }
        }
        if self.position_tolerance < 0.0 {
            return Err(PlanningError::invalid_argument(
                "position tolerance must be non-negative",
            ));
        }
        if self.angular_tolerance < 0.0 {
            return Err(PlanningError::invalid_argument(
                "angular tolerance must be non-negative",
            ));
        }
        self.follow.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseOptions {
    /// Geodesic distance at which the goal counts as reached.
    pub pose_error_tolerance: f64,
    pub follow: FollowOptions,
}

impl Default for PoseOptions {
    fn default() -> Self {
        Self {
            pose_error_tolerance: 0.01,
            follow: FollowOptions::default(),
        }
    }
}

impl PoseOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.pose_error_tolerance > 0.0) {
            return Err(PlanningError::invalid_argument(
                "pose error tolerance must be positive",
            ));
        }
        self.follow.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapOptions {
    /// Largest per-DOF distance, in joint units, that may be snapped.
    pub snap_tolerance: f64,
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self {
            snap_tolerance: 0.1,
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
