//! Result records and point-in-time task snapshots.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    AttemptRecord, Priority, TaskError, TaskId, TaskMetadata, TaskRecord, TaskStatus, TaskType,
};

/// Outcome of a task that reached a terminal state.
///
/// Exactly one exists per terminal task and it is never mutated after
/// creation, so the fields are only reachable through getters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    task_id: TaskId,
    requester_id: String,
    task_type: TaskType,
    task_name: String,
    priority: Priority,
    status: TaskStatus,
    result: Option<Value>,
    error: Option<TaskError>,
    execution_time: Duration,
    completed_at: DateTime<Utc>,
    retry_count: u32,
    attempts: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "TaskMetadata::is_empty")]
    metadata: TaskMetadata,
}

impl ResultRecord {
    pub(crate) fn new(
        record: TaskRecord,
        result: Option<Value>,
        error: Option<TaskError>,
        execution_time: Duration,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: record.task_id,
            requester_id: record.requester_id,
            task_type: record.task_type,
            task_name: record.task_name,
            priority: record.priority,
            status: record.status,
            result,
            error,
            execution_time,
            completed_at,
            retry_count: record.retry_count,
            attempts: record.attempts,
            metadata: record.metadata,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn requester_id(&self) -> &str {
        &self.requester_id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Handler payload; only present for completed tasks.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Metadata copied from the submission request.
    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }
}

/// What `get_task_status` returns: the live record or the final result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskSnapshot {
    Active(TaskRecord),
    Finished(ResultRecord),
}

impl TaskSnapshot {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskSnapshot::Active(record) => record.task_id,
            TaskSnapshot::Finished(result) => result.task_id(),
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            TaskSnapshot::Active(record) => record.status,
            TaskSnapshot::Finished(result) => result.status(),
        }
    }

    pub fn requester_id(&self) -> &str {
        match self {
            TaskSnapshot::Active(record) => &record.requester_id,
            TaskSnapshot::Finished(result) => result.requester_id(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskSnapshot::Finished(_))
    }

    pub fn as_result(&self) -> Option<&ResultRecord> {
        match self {
            TaskSnapshot::Finished(result) => Some(result),
            TaskSnapshot::Active(_) => None,
        }
    }

    pub fn into_result(self) -> Option<ResultRecord> {
        match self {
            TaskSnapshot::Finished(result) => Some(result),
            TaskSnapshot::Active(_) => None,
        }
    }
}
