use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KinematicsError {
    #[error("dimension mismatch: expected {expected} DOF, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("invalid limits for DOF {dof}: lower {lower} exceeds upper {upper}")]
    InvalidLimits { dof: usize, lower: f64, upper: f64 },

    #[error("invalid check resolution for DOF {dof}: {value} must be positive")]
    InvalidResolution { dof: usize, value: f64 },

    #[error("a gantry drives between one and three axes, got {0}")]
    UnsupportedAxes(usize),

    #[error("jacobian is singular: {0}")]
    SingularJacobian(&'static str),
}
