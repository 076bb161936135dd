//! Fault taxonomy of vector-field integration and planner-level errors.

use kinematics::{Bound, CollisionReport, KinematicsError};
use thiserror::Error;

/// A condition that halts integration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    /// A DOF left its position limits.
    #[error("DOF {dof} {bound} position limit violated: {value} beyond {limit}")]
    PositionLimitViolation {
        dof: usize,
        value: f64,
        limit: f64,
        bound: Bound,
    },

    #[error("collided with environment: {0}")]
    Collision(CollisionReport),

    #[error("self collision: {0}")]
    SelfCollision(CollisionReport),

    #[error("reached time limit after {elapsed:.3}s (limit {limit:.3}s)")]
    TimeLimitExceeded { elapsed: f64, limit: f64 },

    /// The termination predicate asked to stop. Only surfaces as an error
    /// when nothing was cached.
    #[error("terminated by callback")]
    UserTerminated,

    /// Numerical or internal failure of the solver.
    #[error("integrator failure: {0}")]
    IntegratorFailure(String),

    /// A task constraint checked by the termination predicate was broken.
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),
}

impl Fault {
    pub fn integrator(reason: impl Into<String>) -> Self {
        Self::IntegratorFailure(reason.into())
    }

    pub fn constraint(reason: impl Into<String>) -> Self {
        Self::ConstraintViolation(reason.into())
    }

    /// Solver failures are fatal even when a prefix was cached.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IntegratorFailure(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningError {
    #[error(transparent)]
    Fault(#[from] Fault),

    /// Invalid call arguments, rejected before any integration starts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("there is no IK solution at the goal pose")]
    NoIkSolution,

    #[error("distance from goal {distance:.4} larger than snap tolerance {tolerance:.4}")]
    SnapToleranceExceeded { distance: f64, tolerance: f64 },

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),
}

impl PlanningError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlanningError>;
