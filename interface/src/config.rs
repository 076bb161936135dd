//! JSON configuration of the `motion-demo` binary.

use std::f64::consts::PI;
use std::path::Path;
use std::sync::Arc;

use kinematics::{Configuration, DofLimits, Environment, Obstacle, PlanarArm, Robot};
use nalgebra::{Point3, Vector3};
use planner::OffsetOptions;
use serde::{Deserialize, Serialize};

use crate::deferred::ExecutionMode;
use crate::execution::ExecutionOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    pub name: String,
    pub link_lengths: Vec<f64>,
    pub start: Vec<f64>,
    pub joint_limit: f64,
    pub velocity_limit: f64,
    pub resolution: f64,
    pub link_radius: f64,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            name: "planar-arm".to_string(),
            link_lengths: vec![1.0, 1.0, 1.0],
            start: vec![0.3, 0.6, -0.4],
            joint_limit: PI,
            velocity_limit: 1.0,
            resolution: 0.01,
            link_radius: 0.02,
        }
    }
}

impl ArmConfig {
    pub fn build(&self) -> Result<Robot, kinematics::KinematicsError> {
        let dof = self.link_lengths.len();
        let limits = DofLimits::uniform(dof, -self.joint_limit, self.joint_limit)?;

        Ok(Robot::new(&self.name, Arc::new(PlanarArm::new(self.link_lengths.clone())), limits)?
            .with_configuration(Configuration::from_vec(self.start.clone()))?
            .with_velocity_limits(Configuration::from_element(dof, self.velocity_limit))?
            .with_resolutions(Configuration::from_element(dof, self.resolution))?
            .with_link_radius(self.link_radius))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphereConfig {
    pub name: String,
    pub center: [f64; 3],
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub arm: ArmConfig,
    pub obstacles: Vec<SphereConfig>,
    /// End-effector direction of the straight-line motion.
    pub direction: [f64; 3],
    pub offset: OffsetOptions,
    pub execution: ExecutionOptions,
    pub mode: ExecutionMode,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            arm: ArmConfig::default(),
            obstacles: Vec::new(),
            direction: [-1.0, 0.0, 0.0],
            offset: OffsetOptions::new(0.2),
            execution: ExecutionOptions::default(),
            mode: ExecutionMode::Synchronous,
        }
    }
}

impl DemoConfig {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn environment(&self) -> Environment {
        self.obstacles.iter().fold(Environment::new(), |environment, sphere| {
            environment.with_obstacle(Obstacle::sphere(
                sphere.name.clone(),
                Point3::from(sphere.center),
                sphere.radius,
            ))
        })
    }

    pub fn direction(&self) -> Vector3<f64> {
        Vector3::from(self.direction)
    }
}
