use std::fmt;
use std::time::{Duration, Instant};

use crate::error::ProgressError;

/// Lifecycle of a unit of work.
///
/// `Pending` is implicit: a task enters the tracker either `Running` or
/// `Skipped`. `Success`, `Error` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Skipped)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Skipped)
                | (Self::Running, Self::Success)
                | (Self::Running, Self::Error)
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Pending => "⏳",
            Self::Running => "🔄",
            Self::Success => "✅",
            Self::Error => "❌",
            Self::Skipped => "⏭️",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// One tracked unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub status: TaskStatus,
    pub message: Option<String>,
    pub total_steps: u64,
    pub completed_steps: u64,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl Task {
    /// A task that has just started.
    pub fn running(name: impl Into<String>, total_steps: u64) -> Self {
        let mut task = Self::pending(name, total_steps);
        task.status = TaskStatus::Running;
        task.started_at = Some(Instant::now());
        task
    }

    /// A task that was never started.
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut task = Self::pending(name, 1);
        task.status = TaskStatus::Skipped;
        task.message = Some(reason.into());
        task.completed_steps = task.total_steps;
        task
    }

    fn pending(name: impl Into<String>, total_steps: u64) -> Self {
        Self {
            name: name.into(),
            status: TaskStatus::Pending,
            message: None,
            total_steps: total_steps.max(1),
            completed_steps: 0,
            started_at: None,
            finished_at: None,
        }
    }

    /// Record `steps` more units of progress, capped at the total.
    pub fn advance(&mut self, steps: u64) {
        self.completed_steps = (self.completed_steps + steps).min(self.total_steps);
    }

    /// Move a running task to `Success` or `Error`.
    pub fn finish(&mut self, success: bool, message: Option<String>) -> Result<(), ProgressError> {
        let next = if success {
            TaskStatus::Success
        } else {
            TaskStatus::Error
        };
        if !self.status.can_transition_to(next) {
            return Err(ProgressError::InvalidTransition {
                name: self.name.clone(),
                status: self.status.to_string(),
            });
        }

        self.status = next;
        self.message = message;
        self.completed_steps = self.total_steps;
        self.finished_at = Some(Instant::now());
        Ok(())
    }

    /// Time between start and finish, once both happened.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }
}
