use std::time::Duration;

use thiserror::Error;

use crate::domain::{TaskId, UnknownTaskType};
use crate::queue::ResourceShortfall;

/// Errors returned synchronously by the task queue manager API.
///
/// Per-task failures never show up here; they are recorded on the task
/// (see [`crate::domain::TaskError`]).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    #[error("resource exhausted: {resource} requested {requested}, limit {limit}")]
    ResourceExhausted {
        resource: String,
        requested: f64,
        limit: f64,
    },

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task queue manager is not running")]
    NotRunning,

    #[error("bounded executor is not running")]
    ExecutorNotRunning,

    #[error(transparent)]
    UnknownTaskType(#[from] UnknownTaskType),

    #[error("task {task_id} did not finish within {waited:?}")]
    WaitTimedOut { task_id: TaskId, waited: Duration },
}

impl From<ResourceShortfall> for QueueError {
    fn from(shortfall: ResourceShortfall) -> Self {
        QueueError::ResourceExhausted {
            resource: shortfall.resource,
            requested: shortfall.requested,
            limit: shortfall.limit,
        }
    }
}

/// Errors raised by the bounded executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("executor is already running")]
    AlreadyRunning,

    #[error("executor is not running")]
    NotRunning,

    #[error("invalid executor configuration: {0}")]
    InvalidConfig(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// Configuration loading errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
