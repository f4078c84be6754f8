//! Task lifecycle state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Task status.
///
/// Transitions:
/// - Pending -> Queued -> Running -> Completed | Failed | Timeout | Cancelled
/// - Running -> Pending (retry, bounded by max_retries)
/// - Queued -> Failed (dependency gate, the task never runs)
/// - Pending | Queued -> Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states are mutually exclusive and have no outgoing edges.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout | TaskStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Cancelled)
                | (Queued, Running)
                | (Queued, Failed)
                | (Queued, Cancelled)
                | (Running, Pending)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Timeout)
                | (Running, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
