use nalgebra::{DVector, Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

pub mod collision;
pub mod error;
pub mod opw_kinematics;
pub mod robot;
pub mod twist;

pub use collision::{CollisionChecker, CollisionKind, CollisionReport, Environment, Obstacle};
pub use error::KinematicsError;
pub use robot::{Bound, DofLimits, LimitViolation, Robot};

/// Joint positions of every active DOF, in index order.
pub type Configuration = DVector<f64>;

/// Controller feedback for one DOF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    pub position: f64,
    pub velocity: f64,
    pub effort: f64,
}

const SEGMENT_EPSILON: f64 = 1e-12;

/// Centre line of one link. Links are treated as capsules around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point3<f64>,
    pub end: Point3<f64>,
}

impl Segment {
    pub fn new(start: Point3<f64>, end: Point3<f64>) -> Self {
        Self { start, end }
    }

    pub fn distance_to_point(&self, point: &Point3<f64>) -> f64 {
        let direction = self.end - self.start;
        let length_squared = direction.norm_squared();
        if length_squared <= SEGMENT_EPSILON {
            return (point - self.start).norm();
        }
        let t = ((point - self.start).dot(&direction) / length_squared).clamp(0.0, 1.0);
        (point - (self.start + direction * t)).norm()
    }

    /// Closest distance between two segments (Ericson, Real-Time Collision Detection 5.1.9).
    pub fn distance_to_segment(&self, other: &Segment) -> f64 {
        let d1 = self.end - self.start;
        let d2 = other.end - other.start;
        let r = self.start - other.start;
        let a = d1.norm_squared();
        let e = d2.norm_squared();
        let f = d2.dot(&r);

        if a <= SEGMENT_EPSILON && e <= SEGMENT_EPSILON {
            return r.norm();
        }

        let (s, t) = if a <= SEGMENT_EPSILON {
            (0.0, (f / e).clamp(0.0, 1.0))
        } else {
            let c = d1.dot(&r);
            if e <= SEGMENT_EPSILON {
                ((-c / a).clamp(0.0, 1.0), 0.0)
            } else {
                let b = d1.dot(&d2);
                let denom = a * e - b * b;
                let s = if denom > SEGMENT_EPSILON {
                    ((b * f - c * e) / denom).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let t = (b * s + f) / e;
                if t < 0.0 {
                    ((-c / a).clamp(0.0, 1.0), 0.0)
                } else if t > 1.0 {
                    (((b - c) / a).clamp(0.0, 1.0), 1.0)
                } else {
                    (s, t)
                }
            }
        };

        let closest_self = self.start + d1 * s;
        let closest_other = other.start + d2 * t;
        (closest_self - closest_other).norm()
    }
}

pub trait ForwardKinematics: Send + Sync {
    fn dof(&self) -> usize;

    fn forward_kinematics(&self, joints: &Configuration) -> Isometry3<f64>;

    /// Link centre lines from base to tool. Backends without link geometry
    /// report a single base-to-tool segment.
    fn link_segments(&self, joints: &Configuration) -> Vec<Segment> {
        let tip = self.forward_kinematics(joints).translation.vector;
        vec![Segment::new(Point3::origin(), Point3::from(tip))]
    }
}

pub trait InverseKinematics: Send + Sync {
    /// All finite joint solutions reaching `pose`, in no particular order.
    fn inverse_kinematics(&self, pose: &Isometry3<f64>) -> Vec<Configuration>;
}

/// Serial chain of revolute joints rotating about Z, every link in the XY plane.
#[derive(Debug, Clone)]
pub struct PlanarArm {
    pub link_lengths: Vec<f64>,
}

impl PlanarArm {
    pub fn new(link_lengths: Vec<f64>) -> Self {
        Self { link_lengths }
    }

    fn joint_positions(&self, joints: &Configuration) -> Vec<Point3<f64>> {
        let mut points = Vec::with_capacity(self.link_lengths.len() + 1);
        let mut point = Point3::origin();
        let mut angle = 0.0;
        points.push(point);
        for (length, joint) in self.link_lengths.iter().zip(joints.iter()) {
            angle += joint;
            point += Vector3::new(length * angle.cos(), length * angle.sin(), 0.0);
            points.push(point);
        }
        points
    }
}

impl ForwardKinematics for PlanarArm {
    fn dof(&self) -> usize {
        self.link_lengths.len()
    }

    fn forward_kinematics(&self, joints: &Configuration) -> Isometry3<f64> {
        if joints.is_empty() {
            return Isometry3::identity();
        }

        let points = self.joint_positions(joints);
        let tip = points.last().copied().unwrap_or_else(Point3::origin);
        let angle: f64 = joints.iter().take(self.link_lengths.len()).sum();
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle);

        Isometry3::from_parts(Translation3::from(tip.coords), rotation)
    }

    fn link_segments(&self, joints: &Configuration) -> Vec<Segment> {
        self.joint_positions(joints)
            .windows(2)
            .map(|pair| Segment::new(pair[0], pair[1]))
            .collect()
    }
}

/// Up to three orthogonal prismatic axes moving a carriage along X, Y and Z.
#[derive(Debug, Clone)]
pub struct CartesianGantry {
    axes: usize,
}

impl CartesianGantry {
    pub fn new(axes: usize) -> Result<Self, KinematicsError> {
        if !(1..=3).contains(&axes) {
            return Err(KinematicsError::UnsupportedAxes(axes));
        }
        Ok(Self { axes })
    }
}

impl ForwardKinematics for CartesianGantry {
    fn dof(&self) -> usize {
        self.axes
    }

    fn forward_kinematics(&self, joints: &Configuration) -> Isometry3<f64> {
        let mut translation = Vector3::zeros();
        for (axis, value) in joints.iter().take(self.axes).enumerate() {
            translation[axis] = *value;
        }
        Isometry3::from_parts(Translation3::from(translation), UnitQuaternion::identity())
    }

    fn link_segments(&self, joints: &Configuration) -> Vec<Segment> {
        let carriage = Point3::from(self.forward_kinematics(joints).translation.vector);
        vec![Segment::new(carriage, carriage)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_planar_arm_fk() {
        let arm = PlanarArm::new(vec![1.0]);
        let joints = Configuration::from_vec(vec![PI / 2.0]);
        let pose = arm.forward_kinematics(&joints);

        assert!((pose.translation.vector.x).abs() < 1e-6);
        assert!((pose.translation.vector.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_planar_arm_link_segments_chain() {
        let arm = PlanarArm::new(vec![1.0, 0.5]);
        let joints = Configuration::from_vec(vec![0.0, PI / 2.0]);
        let segments = arm.link_segments(&joints);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].end, segments[1].start);
        assert_relative_eq!(segments[1].end.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(segments[1].end.y, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_gantry_fk_follows_axes() {
        let gantry = CartesianGantry::new(2).unwrap();
        let pose = gantry.forward_kinematics(&Configuration::from_vec(vec![0.3, -1.2]));

        assert_relative_eq!(pose.translation.vector.x, 0.3);
        assert_relative_eq!(pose.translation.vector.y, -1.2);
        assert_relative_eq!(pose.translation.vector.z, 0.0);
        assert!(CartesianGantry::new(4).is_err());
    }

    #[test]
    fn test_segment_distances() {
        let a = Segment::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        let b = Segment::new(Point3::new(0.5, 1.0, 0.0), Point3::new(0.5, 2.0, 0.0));
        let crossing = Segment::new(Point3::new(0.5, -1.0, 0.0), Point3::new(0.5, 1.0, 0.0));

        assert_relative_eq!(a.distance_to_segment(&b), 1.0, epsilon = 1e-12);
        assert_relative_eq!(a.distance_to_segment(&crossing), 0.0, epsilon = 1e-12);
        assert_relative_eq!(a.distance_to_point(&Point3::new(2.0, 0.0, 0.0)), 1.0);
    }
}
