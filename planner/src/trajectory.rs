//! Output trajectories and their metadata tags.

use std::collections::BTreeMap;

use kinematics::Configuration;
use serde::{Deserialize, Serialize};

/// Tag keys read by post-processing to pick an execution pipeline.
pub mod tags {
    /// Every waypoint matters; the path must be executed without deviation.
    pub const CONSTRAINED: &str = "constrained";
    /// The path came from integrating a continuous field.
    pub const SMOOTH: &str = "smooth";
    /// Delta times respect the robot's velocity limits.
    pub const TIMED: &str = "timed";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Text(String),
}

impl TagValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(value) => Some(*value),
            TagValue::Text(text) => text.parse().ok(),
        }
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Time since the previous waypoint; zero for the first one.
    pub delta_time: f64,
    pub configuration: Configuration,
}

impl Waypoint {
    pub fn new(delta_time: f64, configuration: Configuration) -> Self {
        Self {
            delta_time,
            configuration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trajectory {
    waypoints: Vec<Waypoint>,
    #[serde(default)]
    tags: BTreeMap<String, TagValue>,
}

impl Trajectory {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self {
            waypoints,
            tags: BTreeMap::new(),
        }
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn into_waypoints(self) -> Vec<Waypoint> {
        self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn first(&self) -> Option<&Waypoint> {
        self.waypoints.first()
    }

    pub fn last(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }

    pub fn duration(&self) -> f64 {
        self.waypoints.iter().map(|w| w.delta_time).sum()
    }

    /// Cumulative time of every waypoint.
    pub fn times(&self) -> Vec<f64> {
        self.waypoints
            .iter()
            .scan(0.0, |elapsed, waypoint| {
                *elapsed += waypoint.delta_time;
                Some(*elapsed)
            })
            .collect()
    }

    /// Linear interpolation between waypoints, clamped to the ends.
    pub fn sample(&self, t: f64) -> Option<Configuration> {
        let times = self.times();
        let index = times.partition_point(|time| *time < t);

        if index == 0 {
            return self.first().map(|w| w.configuration.clone());
        }
        if index >= self.waypoints.len() {
            return self.last().map(|w| w.configuration.clone());
        }

        let (t0, t1) = (times[index - 1], times[index]);
        let q0 = &self.waypoints[index - 1].configuration;
        let q1 = &self.waypoints[index].configuration;
        let s = if t1 > t0 { (t - t0) / (t1 - t0) } else { 1.0 };
        Some(q0 + (q1 - q0) * s)
    }

    pub fn tags(&self) -> &BTreeMap<String, TagValue> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    /// Boolean value of a tag; missing or unparsable tags read as `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.tag(key).and_then(TagValue::as_bool).unwrap_or(false)
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.set_tag(key, value);
        self
    }
}
