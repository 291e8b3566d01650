//! Task lifecycle tracking with live terminal progress bars.

mod task;
mod tracker;

pub use task::{Task, TaskStatus};
pub use tracker::{ProgressTracker, TaskGuard, TaskSummary, TrackerGuard};
