//! Execution history: one record per attempt of a task.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskError, TaskStatus};

/// A single execution attempt of a task.
///
/// `status` is the per-attempt outcome: `Completed`, `Failed` or `Timeout`.
/// A task that times out and is then retried keeps its `Timeout` attempts
/// here even though its own status moves back to `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl AttemptRecord {
    pub fn succeeded(attempt: u32, started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            attempt,
            status: TaskStatus::Completed,
            error: None,
            started_at,
            duration,
        }
    }

    pub fn failed(
        attempt: u32,
        started_at: DateTime<Utc>,
        duration: Duration,
        error: TaskError,
    ) -> Self {
        let status = if error.is_timeout() {
            TaskStatus::Timeout
        } else {
            TaskStatus::Failed
        };
        Self {
            attempt,
            status,
            error: Some(error),
            started_at,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_recorded_as_timeout_attempts() {
        let a = AttemptRecord::failed(
            1,
            Utc::now(),
            Duration::from_millis(10),
            TaskError::TimedOut {
                timeout: Duration::from_millis(10),
            },
        );
        assert_eq!(a.status, TaskStatus::Timeout);
    }

    #[test]
    fn handler_errors_are_recorded_as_failed_attempts() {
        let a = AttemptRecord::failed(
            2,
            Utc::now(),
            Duration::ZERO,
            TaskError::ExecutionFailed {
                message: "nope".into(),
            },
        );
        assert_eq!(a.status, TaskStatus::Failed);
        assert_eq!(a.attempt, 2);
    }
}
