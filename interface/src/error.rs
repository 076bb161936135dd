use planner::PlanningError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Planning(#[from] PlanningError),

    /// The chain was cancelled before this stage started.
    #[error("execution cancelled")]
    Cancelled,

    /// The worker running a stage panicked or was aborted.
    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("controller error: {0}")]
    Controller(String),

    #[error("timed out after {0:.3}s waiting for the controller")]
    Timeout(f64),
}

impl ExecutionError {
    pub fn controller(reason: impl Into<String>) -> Self {
        Self::Controller(reason.into())
    }
}

impl From<tokio::task::JoinError> for ExecutionError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::TaskFailed(error.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
