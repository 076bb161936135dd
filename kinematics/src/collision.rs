//! Collision oracle over link capsules.

use std::fmt;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::Robot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionKind {
    Environment,
    SelfCollision,
}

/// First contact found by a collision query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionReport {
    pub kind: CollisionKind,
    pub robot: String,
    pub link: usize,
    pub other: String,
    pub penetration: f64,
}

impl fmt::Display for CollisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} link {} collides with {} (penetration {:.4})",
            self.robot, self.link, self.other, self.penetration
        )
    }
}

pub trait CollisionChecker: Send + Sync {
    /// Checks the robot's live configuration against the world.
    fn check_environment_collision(&self, robot: &Robot) -> Option<CollisionReport>;

    /// Checks non-adjacent links of the robot's live configuration.
    fn check_self_collision(&self, robot: &Robot) -> Option<CollisionReport>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub name: String,
    pub center: Point3<f64>,
    pub radius: f64,
}

impl Obstacle {
    pub fn sphere(name: impl Into<String>, center: Point3<f64>, radius: f64) -> Self {
        Self {
            name: name.into(),
            center,
            radius,
        }
    }
}

/// Static world of spherical obstacles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    obstacles: Vec<Obstacle>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_obstacle(mut self, obstacle: Obstacle) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }
}

impl CollisionChecker for Environment {
    fn check_environment_collision(&self, robot: &Robot) -> Option<CollisionReport> {
        let radius = robot.link_radius();
        robot
            .link_segments()
            .iter()
            .enumerate()
            .find_map(|(link, segment)| {
                self.obstacles.iter().find_map(|obstacle| {
                    let penetration =
                        radius + obstacle.radius - segment.distance_to_point(&obstacle.center);
                    (penetration > 0.0).then(|| CollisionReport {
                        kind: CollisionKind::Environment,
                        robot: robot.name().to_string(),
                        link,
                        other: obstacle.name.clone(),
                        penetration,
                    })
                })
            })
    }

    fn check_self_collision(&self, robot: &Robot) -> Option<CollisionReport> {
        let segments = robot.link_segments();
        let clearance = 2.0 * robot.link_radius();

        for (i, first) in segments.iter().enumerate() {
            for (j, second) in segments.iter().enumerate().skip(i + 2) {
                let penetration = clearance - first.distance_to_segment(second);
                if penetration > 0.0 {
                    return Some(CollisionReport {
                        kind: CollisionKind::SelfCollision,
                        robot: robot.name().to_string(),
                        link: i,
                        other: format!("link {j}"),
                        penetration,
                    });
                }
            }
        }
        None
    }
}
