//! Task submission request and the live task record.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AttemptRecord, Priority, ResultRecord, TaskError, TaskId, TaskStatus, TaskType};

/// Parameters handed to a task handler.
pub type TaskParams = serde_json::Map<String, Value>;

/// Declared resource demand: resource name -> amount.
pub type ResourceRequirements = BTreeMap<String, f64>;

/// Caller-defined annotations. Never read by the queue, only carried along.
pub type TaskMetadata = serde_json::Map<String, Value>;

/// Everything a caller supplies when submitting a task.
///
/// `timeout` and `max_retries` fall back to the manager's defaults when unset.
///
/// ```ignore
/// let request = TaskRequest::new("agent-7", TaskType::Computational, "sum")
///     .params(json!({ "operation": "add", "values": [1, 2, 3] }))
///     .priority(Priority::High)
///     .depends_on(previous);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub requester_id: String,
    pub task_type: TaskType,
    pub task_name: String,
    #[serde(default)]
    pub params: TaskParams,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub resource_requirements: ResourceRequirements,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

impl TaskRequest {
    pub fn new(
        requester_id: impl Into<String>,
        task_type: TaskType,
        task_name: impl Into<String>,
    ) -> Self {
        Self {
            requester_id: requester_id.into(),
            task_type,
            task_name: task_name.into(),
            params: TaskParams::new(),
            priority: Priority::default(),
            timeout: None,
            dependencies: Vec::new(),
            resource_requirements: ResourceRequirements::new(),
            max_retries: None,
            metadata: TaskMetadata::new(),
        }
    }

    /// Replace the parameter map. A non-object value is stored under `"value"`.
    pub fn params(mut self, params: Value) -> Self {
        self.params = match params {
            Value::Object(map) => map,
            other => {
                let mut map = TaskParams::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn depends_on(mut self, task_id: TaskId) -> Self {
        self.dependencies.push(task_id);
        self
    }

    pub fn dependencies(mut self, task_ids: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies.extend(task_ids);
        self
    }

    pub fn require(mut self, resource: impl Into<String>, amount: f64) -> Self {
        self.resource_requirements.insert(resource.into(), amount);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Identity, inputs and mutable lifecycle state of one accepted task.
///
/// Owned by the manager; callers only ever see clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub requester_id: String,
    pub task_type: TaskType,
    pub task_name: String,
    pub params: TaskParams,
    pub priority: Priority,
    pub timeout: Duration,
    pub dependencies: Vec<TaskId>,
    pub resource_requirements: ResourceRequirements,
    pub max_retries: u32,
    pub metadata: TaskMetadata,

    pub status: TaskStatus,
    /// Number of retries consumed so far; never exceeds `max_retries`.
    pub retry_count: u32,
    pub last_error: Option<TaskError>,
    pub attempts: Vec<AttemptRecord>,

    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub(crate) fn new(
        task_id: TaskId,
        request: TaskRequest,
        timeout: Duration,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            requester_id: request.requester_id,
            task_type: request.task_type,
            task_name: request.task_name,
            params: request.params,
            priority: request.priority,
            timeout,
            dependencies: request.dependencies,
            resource_requirements: request.resource_requirements,
            max_retries,
            metadata: request.metadata,
            status: TaskStatus::Pending,
            retry_count: 0,
            last_error: None,
            attempts: Vec::new(),
            created_at: now,
            queued_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: TaskStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal transition {} -> {}",
            self.status,
            next
        );
        self.status = next;
    }

    /// Pending -> Queued.
    pub(crate) fn mark_queued(&mut self, now: DateTime<Utc>) {
        self.transition(TaskStatus::Queued);
        self.queued_at = Some(now);
    }

    /// Queued -> Running. Returns the 1-based attempt number.
    pub(crate) fn start_attempt(&mut self, now: DateTime<Utc>) -> u32 {
        self.transition(TaskStatus::Running);
        self.started_at = Some(now);
        self.attempt_count() + 1
    }

    pub(crate) fn record_attempt(&mut self, attempt: AttemptRecord) {
        self.attempts.push(attempt);
    }

    /// Running -> Pending, consuming one retry.
    pub(crate) fn schedule_retry(&mut self, error: TaskError) {
        debug_assert!(self.can_retry());
        self.transition(TaskStatus::Pending);
        self.retry_count += 1;
        self.last_error = Some(error);
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }

    /// Move into a terminal state and produce the permanent result record.
    pub(crate) fn finish(
        mut self,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<TaskError>,
        execution_time: Duration,
        now: DateTime<Utc>,
    ) -> ResultRecord {
        debug_assert!(status.is_terminal());
        self.transition(status);
        self.completed_at = Some(now);
        if error.is_some() {
            self.last_error.clone_from(&error);
        }
        ResultRecord::new(self, result, error, execution_time, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ulid::Ulid;

    fn record(max_retries: u32) -> TaskRecord {
        let request = TaskRequest::new("agent-1", TaskType::Computational, "sum")
            .params(json!({ "values": [1, 2, 3] }));
        TaskRecord::new(
            TaskId::from_ulid(Ulid::new()),
            request,
            Duration::from_secs(1),
            max_retries,
            Utc::now(),
        )
    }

    #[test]
    fn builder_collects_inputs() {
        let dep = TaskId::from_ulid(Ulid::new());
        let req = TaskRequest::new("agent-1", TaskType::Analysis, "stats")
            .param("type", "trend")
            .priority(Priority::Urgent)
            .timeout(Duration::from_millis(250))
            .depends_on(dep)
            .require("cpu", 12.5)
            .max_retries(0)
            .metadata("source", "scheduler");

        assert_eq!(req.params["type"], "trend");
        assert_eq!(req.priority, Priority::Urgent);
        assert_eq!(req.timeout, Some(Duration::from_millis(250)));
        assert_eq!(req.dependencies, vec![dep]);
        assert_eq!(req.resource_requirements["cpu"], 12.5);
        assert_eq!(req.max_retries, Some(0));
        assert_eq!(req.metadata["source"], "scheduler");
    }

    #[test]
    fn non_object_params_are_wrapped() {
        let req = TaskRequest::new("a", TaskType::Processing, "p").params(json!([3, 1, 2]));
        assert_eq!(req.params["value"], json!([3, 1, 2]));
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let req: TaskRequest = serde_json::from_value(json!({
            "requester_id": "agent-9",
            "task_type": "validation",
            "task_name": "check"
        }))
        .unwrap();
        assert_eq!(req.priority, Priority::Normal);
        assert!(req.params.is_empty());
        assert!(req.timeout.is_none());
        assert!(req.metadata.is_empty());
    }

    #[test]
    fn retry_counter_is_bounded_by_max_retries() {
        let mut r = record(1);
        let now = Utc::now();
        r.mark_queued(now);
        assert_eq!(r.start_attempt(now), 1);
        assert!(r.can_retry());
        r.schedule_retry(TaskError::ExecutionFailed {
            message: "first".into(),
        });
        assert_eq!(r.retry_count, 1);
        assert_eq!(r.status, TaskStatus::Pending);
        assert!(!r.can_retry());
    }

    #[test]
    fn finish_produces_result_with_history() {
        let mut r = record(0);
        let now = Utc::now();
        r.mark_queued(now);
        let attempt = r.start_attempt(now);
        r.record_attempt(AttemptRecord::succeeded(attempt, now, Duration::from_millis(3)));

        let result = r.finish(
            TaskStatus::Completed,
            Some(json!(6)),
            None,
            Duration::from_millis(3),
            now,
        );
        assert_eq!(result.status(), TaskStatus::Completed);
        assert_eq!(result.result(), Some(&json!(6)));
        assert_eq!(result.attempts().len(), 1);
        assert!(result.error().is_none());
    }
}
