//! Per-task failure taxonomy.
//!
//! These never cross the submit/status API boundary as `Err`; they are stored
//! on the task record and end up in its result record.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{TaskId, TaskType};
use crate::error::ExecError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    #[error("dependencies not satisfied: {}", join_ids(.task_ids))]
    DependenciesNotSatisfied { task_ids: Vec<TaskId> },

    #[error("no handler registered for task type {task_type}")]
    NoHandlerRegistered { task_type: TaskType },

    #[error("execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("timed out after {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("task cancelled by user")]
    Cancelled,

    #[error("task queue manager shut down")]
    Shutdown,
}

impl TaskError {
    /// Only handler failures and timeouts are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::ExecutionFailed { .. } | TaskError::TimedOut { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::TimedOut { .. })
    }
}

impl From<ExecError> for TaskError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::TimedOut(timeout) => TaskError::TimedOut { timeout },
            ExecError::ExecutionFailed(message) => TaskError::ExecutionFailed { message },
            other => TaskError::ExecutionFailed {
                message: other.to_string(),
            },
        }
    }
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
