use std::fmt;
use std::sync::Arc;

use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

use crate::{Configuration, ForwardKinematics, JointState, KinematicsError, Segment};

const DEFAULT_RESOLUTION: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bound {
    Lower,
    Upper,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Lower => write!(f, "lower"),
            Bound::Upper => write!(f, "upper"),
        }
    }
}

/// A DOF found outside its position limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitViolation {
    pub dof: usize,
    pub value: f64,
    pub limit: f64,
    pub bound: Bound,
}

/// Per-DOF position limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DofLimits {
    lower: Configuration,
    upper: Configuration,
}

impl DofLimits {
    pub fn new(lower: Configuration, upper: Configuration) -> Result<Self, KinematicsError> {
        if lower.len() != upper.len() {
            return Err(KinematicsError::DimensionMismatch {
                expected: lower.len(),
                found: upper.len(),
            });
        }
        for (dof, (l, u)) in lower.iter().zip(upper.iter()).enumerate() {
            if l > u {
                return Err(KinematicsError::InvalidLimits {
                    dof,
                    lower: *l,
                    upper: *u,
                });
            }
        }
        Ok(Self { lower, upper })
    }

    pub fn uniform(dof: usize, lower: f64, upper: f64) -> Result<Self, KinematicsError> {
        Self::new(
            Configuration::from_element(dof, lower),
            Configuration::from_element(dof, upper),
        )
    }

    pub fn dof(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &Configuration {
        &self.lower
    }

    pub fn upper(&self) -> &Configuration {
        &self.upper
    }

    /// First offending DOF in index order. Lower bounds are scanned before
    /// upper bounds.
    pub fn first_violation(&self, q: &Configuration) -> Option<LimitViolation> {
        let below = q
            .iter()
            .zip(self.lower.iter())
            .position(|(value, limit)| value < limit)
            .map(|dof| LimitViolation {
                dof,
                value: q[dof],
                limit: self.lower[dof],
                bound: Bound::Lower,
            });

        below.or_else(|| {
            q.iter()
                .zip(self.upper.iter())
                .position(|(value, limit)| value > limit)
                .map(|dof| LimitViolation {
                    dof,
                    value: q[dof],
                    limit: self.upper[dof],
                    bound: Bound::Upper,
                })
        })
    }

    pub fn contains(&self, q: &Configuration) -> bool {
        q.len() == self.dof() && self.first_violation(q).is_none()
    }
}

/// Live state of one robot: its kinematics backend, the configuration the
/// collision oracle sees, and the per-DOF limits used while planning.
///
/// Cloning is cheap and yields an independent instance; two planners must
/// never share one `Robot` mutably.
#[derive(Clone)]
pub struct Robot {
    name: String,
    kinematics: Arc<dyn ForwardKinematics>,
    configuration: Configuration,
    limits: DofLimits,
    velocity_limits: Configuration,
    resolutions: Configuration,
    link_radius: f64,
}

impl fmt::Debug for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Robot")
            .field("name", &self.name)
            .field("configuration", &self.configuration)
            .field("limits", &self.limits)
            .field("link_radius", &self.link_radius)
            .finish_non_exhaustive()
    }
}

impl Robot {
    pub fn new(
        name: impl Into<String>,
        kinematics: Arc<dyn ForwardKinematics>,
        limits: DofLimits,
    ) -> Result<Self, KinematicsError> {
        let dof = kinematics.dof();
        check_dimension(dof, limits.dof())?;

        let configuration = Configuration::from_iterator(
            dof,
            limits
                .lower()
                .iter()
                .zip(limits.upper().iter())
                .map(|(lower, upper)| 0.0_f64.clamp(*lower, *upper)),
        );

        Ok(Self {
            name: name.into(),
            kinematics,
            configuration,
            limits,
            velocity_limits: Configuration::from_element(dof, 1.0),
            resolutions: Configuration::from_element(dof, DEFAULT_RESOLUTION),
            link_radius: 0.0,
        })
    }

    pub fn with_configuration(mut self, q: Configuration) -> Result<Self, KinematicsError> {
        self.set_configuration(&q)?;
        Ok(self)
    }

    pub fn with_velocity_limits(mut self, limits: Configuration) -> Result<Self, KinematicsError> {
        check_dimension(self.dof(), limits.len())?;
        self.velocity_limits = limits;
        Ok(self)
    }

    pub fn with_resolutions(mut self, resolutions: Configuration) -> Result<Self, KinematicsError> {
        check_dimension(self.dof(), resolutions.len())?;
        if let Some(dof) = resolutions.iter().position(|r| !(*r > 0.0)) {
            return Err(KinematicsError::InvalidResolution {
                dof,
                value: resolutions[dof],
            });
        }
        self.resolutions = resolutions;
        Ok(self)
    }

    pub fn with_link_radius(mut self, radius: f64) -> Self {
        self.link_radius = radius.max(0.0);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dof(&self) -> usize {
        self.kinematics.dof()
    }

    pub fn kinematics(&self) -> &dyn ForwardKinematics {
        self.kinematics.as_ref()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Commits `q` as the live configuration. Limits are not checked here.
    pub fn set_configuration(&mut self, q: &Configuration) -> Result<(), KinematicsError> {
        check_dimension(self.dof(), q.len())?;
        self.configuration.copy_from(q);
        Ok(())
    }

    pub fn position_limits(&self) -> &DofLimits {
        &self.limits
    }

    pub fn velocity_limits(&self) -> &Configuration {
        &self.velocity_limits
    }

    pub fn resolutions(&self) -> &Configuration {
        &self.resolutions
    }

    pub fn link_radius(&self) -> f64 {
        self.link_radius
    }

    pub fn end_effector_transform(&self) -> Isometry3<f64> {
        self.kinematics.forward_kinematics(&self.configuration)
    }

    pub fn transform_at(&self, q: &Configuration) -> Isometry3<f64> {
        self.kinematics.forward_kinematics(q)
    }

    pub fn link_segments(&self) -> Vec<Segment> {
        self.kinematics.link_segments(&self.configuration)
    }

    /// Feedback for the committed configuration, at rest.
    pub fn joint_states(&self) -> Vec<JointState> {
        self.configuration
            .iter()
            .map(|&position| JointState {
                position,
                ..Default::default()
            })
            .collect()
    }
}

fn check_dimension(expected: usize, found: usize) -> Result<(), KinematicsError> {
    if expected != found {
        return Err(KinematicsError::DimensionMismatch { expected, found });
    }
    Ok(())
}
