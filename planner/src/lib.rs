//! Constraint-monitored motion synthesis by following joint-space vector
//! fields, plus the small planners built on top of it.

pub mod cache;
pub mod config;
pub mod context;
pub mod discretize;
pub mod error;
pub mod monitor;
pub mod ode;
pub mod snap;
pub mod status;
pub mod trajectory;
pub mod vectorfield;

pub use config::{FollowOptions, OffsetOptions, PoseOptions, SnapOptions};
pub use context::PlanningContext;
pub use error::{Fault, PlanningError, Result};
pub use monitor::ConstraintMonitor;
pub use snap::SnapPlanner;
pub use status::Status;
pub use trajectory::{TagValue, Trajectory, Waypoint, tags};
pub use vectorfield::{VectorFieldPlanner, follow_vector_field};
