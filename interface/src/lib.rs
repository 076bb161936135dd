//! Deferred planning, post-processing and execution of robot motions.

pub mod config;
pub mod controller;
pub mod deferred;
pub mod error;
pub mod execution;
pub mod pipeline;

pub use controller::{IdealController, TrajectoryController, wait_for_completion};
pub use deferred::{DeferredExecutor, DeferredTask, Execution, ExecutionMode};
pub use error::ExecutionError;
pub use execution::{ExecutionOptions, ExecutionPipeline};
pub use pipeline::{PostProcessOptions, PostProcessPipeline, violates_velocity_limits};
