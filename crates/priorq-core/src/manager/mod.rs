//! Task queue manager.
//!
//! Tasks wait on one lane per priority; a group of worker loops drains the
//! lanes most-urgent-first and runs each task through the shared
//! [`BoundedExecutor`]. All queue state sits behind one lock that is never
//! held across an await on a handler.

mod config;
mod state;
mod stats;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::{
    ResultRecord, TaskError, TaskId, TaskRecord, TaskRequest, TaskSnapshot, TaskType,
};
use crate::error::QueueError;
use crate::executor::BoundedExecutor;
use crate::handler::{HandlerRegistry, TaskHandler};
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};

pub use config::{CeilingPolicy, ManagerConfig};
pub use stats::QueueStatistics;

use state::{Completion, Dispatch, ManagerState, RunTicket};
use worker::WorkerGroup;

/// Shared between the manager handle and its worker loops.
pub(crate) struct Inner {
    config: ManagerConfig,
    executor: Arc<BoundedExecutor>,
    state: Mutex<ManagerState>,
    handlers: RwLock<HandlerRegistry>,
    /// Wakes one idle worker loop when a lane gains work.
    work_ready: Notify,
    /// Wakes every `wait_for_result` caller when any task becomes terminal.
    task_finished: Notify,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Inner {
    /// Wait until a task can run. Cancel-safe: the ticket is handed out in
    /// the same poll that creates it.
    async fn next_ticket(&self) -> RunTicket {
        loop {
            let (dispatch, finalized, more_work) = {
                let mut state = self.state.lock().await;
                let dispatch = state.next_dispatch(self.clock.now(), Instant::now(), &self.config);
                (dispatch, state.take_finalized(), state.has_queued_work())
            };
            if finalized {
                self.task_finished.notify_waiters();
            }

            match dispatch {
                Dispatch::Run(ticket) => {
                    if more_work {
                        self.work_ready.notify_one();
                    }
                    return ticket;
                }
                Dispatch::Saturated => {
                    tokio::time::sleep(self.config.ceiling_backoff).await;
                }
                Dispatch::Idle {
                    next_due: Some(due),
                } => {
                    tokio::select! {
                        _ = self.work_ready.notified() => {}
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }
                Dispatch::Idle { next_due: None } => {
                    self.work_ready.notified().await;
                }
            }
        }
    }

    /// Run one attempt and report its outcome.
    async fn run(&self, worker: &str, mut ticket: RunTicket) {
        debug!(
            worker,
            task_id = %ticket.task_id,
            task_type = %ticket.task_type,
            priority = %ticket.priority,
            attempt = ticket.attempt,
            "processing task"
        );

        let handler = self.handlers.read().await.get(ticket.task_type);
        let outcome = match handler {
            None => Err(TaskError::NoHandlerRegistered {
                task_type: ticket.task_type,
            }),
            Some(handler) => {
                let params = std::mem::take(&mut ticket.params);
                self.executor
                    .execute(handler, params, Some(ticket.timeout))
                    .await
                    .map_err(TaskError::from)
            }
        };
        let error_message = outcome.as_ref().err().map(ToString::to_string);

        let (completion, finalized, more_work) = {
            let mut state = self.state.lock().await;
            let completion = state.complete(
                &ticket,
                outcome,
                self.clock.now(),
                Instant::now(),
                &self.config,
            );
            (completion, state.take_finalized(), state.has_queued_work())
        };

        let task_id = ticket.task_id;
        let error = error_message.as_deref().unwrap_or_default();
        match &completion {
            Completion::Completed => {
                info!(worker, task_id = %task_id, "task completed");
            }
            Completion::Retrying { retry, delay } => {
                warn!(worker, task_id = %task_id, retry, delay = ?delay, error, "task failed, retrying");
            }
            Completion::Finished(status) => {
                error!(worker, task_id = %task_id, status = %status, error, "task failed permanently");
            }
            Completion::Discarded => {
                debug!(worker, task_id = %task_id, "task was cancelled while running, outcome dropped");
            }
        }

        // A delayed retry needs an idle worker to re-read the next due time.
        if more_work || matches!(completion, Completion::Retrying { .. }) {
            self.work_ready.notify_one();
        }
        if finalized {
            self.task_finished.notify_waiters();
        }
    }
}

/// Priority task queue in front of a [`BoundedExecutor`].
///
/// Build one per composition root and share it behind an `Arc`. Dropping
/// the manager without [`shutdown`](Self::shutdown) stops idle worker loops
/// but leaves queued tasks unfinished.
pub struct TaskQueueManager {
    inner: Arc<Inner>,
    workers: Mutex<Option<WorkerGroup>>,
}

impl TaskQueueManager {
    pub fn new(config: ManagerConfig, executor: Arc<BoundedExecutor>) -> Self {
        Self::with_ports(
            config,
            executor,
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
        )
    }

    /// Like [`new`](Self::new) with explicit clock and ID ports.
    pub fn with_ports(
        config: ManagerConfig,
        executor: Arc<BoundedExecutor>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                executor,
                state: Mutex::new(ManagerState::default()),
                handlers: RwLock::new(HandlerRegistry::new()),
                work_ready: Notify::new(),
                task_finished: Notify::new(),
                clock,
                ids,
            }),
            workers: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Start the worker loops. A second call does nothing.
    pub async fn initialize(&self) -> Result<(), QueueError> {
        let mut workers = self.workers.lock().await;
        if workers.is_some() {
            return Ok(());
        }
        if !self.inner.executor.is_running().await {
            return Err(QueueError::ExecutorNotRunning);
        }

        {
            let mut state = self.inner.state.lock().await;
            state.running = true;
            state.initialized_at = Some(Instant::now());
        }
        let group = WorkerGroup::spawn(
            self.inner.config.workers_per_priority.max(1),
            Arc::clone(&self.inner),
        );
        info!(
            workers = group.len(),
            max_concurrent = self.inner.config.max_concurrent_tasks,
            ceiling_policy = %self.inner.config.ceiling_policy,
            "task queue manager initialized"
        );
        *workers = Some(group);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running
    }

    /// Stop accepting tasks, let every worker finish its current task, then
    /// cancel whatever is still active. Leaves the executor running.
    pub async fn shutdown(&self) {
        let Some(group) = self.workers.lock().await.take() else {
            return;
        };
        self.inner.state.lock().await.running = false;
        group.shutdown_and_join().await;

        let (cancelled, finalized) = {
            let mut state = self.inner.state.lock().await;
            let cancelled = state.cancel_all(TaskError::Shutdown, self.inner.clock.now());
            (cancelled, state.take_finalized())
        };
        if finalized {
            self.inner.task_finished.notify_waiters();
        }
        info!(cancelled, "task queue manager shut down");
    }

    /// Returns true when an earlier handler for `task_type` was replaced.
    pub async fn register_task_handler(
        &self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> bool {
        let replaced = self
            .inner
            .handlers
            .write()
            .await
            .register(task_type, handler)
            .is_some();
        info!(task_type = %task_type, replaced, "registered task handler");
        replaced
    }

    pub async fn register_task_handler_named(
        &self,
        tag: &str,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<bool, QueueError> {
        let replaced = self
            .inner
            .handlers
            .write()
            .await
            .register_named(tag, handler)?
            .is_some();
        info!(task_type = tag, replaced, "registered task handler");
        Ok(replaced)
    }

    pub async fn registered_task_types(&self) -> Vec<TaskType> {
        self.inner.handlers.read().await.registered_types()
    }

    /// Accept a task onto its priority lane.
    pub async fn submit_task(&self, request: TaskRequest) -> Result<TaskId, QueueError> {
        let config = &self.inner.config;
        let now = self.inner.clock.now();

        let record = {
            let mut state = self.inner.state.lock().await;
            if !state.running {
                return Err(QueueError::NotRunning);
            }
            if let Err(shortfall) = config.resource_limits.check(&request.resource_requirements) {
                warn!(
                    requester_id = %request.requester_id,
                    task_name = %request.task_name,
                    resource = %shortfall.resource,
                    requested = shortfall.requested,
                    limit = shortfall.limit,
                    "task rejected: resource limit exceeded"
                );
                return Err(shortfall.into());
            }

            let mut task_id = self.inner.ids.generate_task_id();
            while state.contains(&task_id) {
                task_id = self.inner.ids.generate_task_id();
            }
            let timeout = request.timeout.unwrap_or(config.default_timeout);
            let max_retries = request.max_retries.unwrap_or(config.default_max_retries);
            let record = TaskRecord::new(task_id, request, timeout, max_retries, now);
            state.admit(record.clone(), now);
            record
        };
        self.inner.work_ready.notify_one();

        info!(
            task_id = %record.task_id,
            requester_id = %record.requester_id,
            task_type = %record.task_type,
            task_name = %record.task_name,
            priority = %record.priority,
            dependencies = record.dependencies.len(),
            "task submitted"
        );
        Ok(record.task_id)
    }

    pub async fn get_task_status(&self, task_id: TaskId) -> Result<TaskSnapshot, QueueError> {
        self.inner
            .state
            .lock()
            .await
            .snapshot(&task_id)
            .ok_or(QueueError::NotFound(task_id))
    }

    /// Cancel a task that has not reached a terminal state.
    ///
    /// A RUNNING task is finalized at once; its handler keeps running in the
    /// executor and whatever it returns is dropped.
    pub async fn cancel_task(&self, task_id: TaskId) -> bool {
        let cancelled = self
            .inner
            .state
            .lock()
            .await
            .cancel(task_id, TaskError::Cancelled, self.inner.clock.now());
        if cancelled {
            self.inner.task_finished.notify_waiters();
            info!(task_id = %task_id, "task cancelled");
        }
        cancelled
    }

    /// Every task a requester submitted, active or finished, in submission
    /// order.
    pub async fn get_agent_tasks(&self, requester_id: &str) -> Vec<TaskSnapshot> {
        self.inner
            .state
            .lock()
            .await
            .requester_snapshots(requester_id)
    }

    pub async fn get_queue_statistics(&self) -> QueueStatistics {
        let executor = self.inner.executor.stats().await;
        let state = self.inner.state.lock().await;
        let counters = state.counters();
        let uptime = state
            .initialized_at
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO);

        QueueStatistics {
            initialized: state.running,
            uptime,
            submitted: counters.submitted,
            completed: counters.completed,
            failed: counters.failed,
            cancelled: counters.cancelled,
            retried: counters.retried,
            active: state.active_count(),
            finished: state.finished_count(),
            queue_sizes: state.queue_depths(),
            scheduled_retries: state.scheduled_retries(),
            current_concurrent: counters.concurrent,
            peak_concurrent: counters.peak_concurrent,
            max_concurrent: self.inner.config.max_concurrent_tasks,
            success_rate: stats::success_rate(counters.completed, counters.failed),
            throughput_per_minute: stats::throughput_per_minute(counters.completed, uptime),
            executor,
        }
    }

    /// Wait until the task is terminal and return its result.
    pub async fn wait_for_result(
        &self,
        task_id: TaskId,
        timeout: Duration,
    ) -> Result<ResultRecord, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.task_finished.notified();
            tokio::pin!(notified);
            // register before checking so a completion in between is not missed
            notified.as_mut().enable();

            {
                let state = self.inner.state.lock().await;
                if let Some(result) = state.result(&task_id) {
                    return Ok(result.clone());
                }
                if !state.contains(&task_id) {
                    return Err(QueueError::NotFound(task_id));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(QueueError::WaitTimedOut {
                    task_id,
                    waited: timeout,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, TaskStatus};
    use crate::executor::ExecutorConfig;
    use crate::handler::{HandlerError, handler_fn};
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};

    async fn executor(max_workers: usize) -> Arc<BoundedExecutor> {
        let exec = Arc::new(BoundedExecutor::new());
        exec.initialize(ExecutorConfig {
            max_workers,
            default_timeout: Duration::from_secs(5),
            max_retries: 2,
        })
        .await
        .unwrap();
        exec
    }

    async fn manager(max_workers: usize) -> TaskQueueManager {
        let exec = executor(max_workers).await;
        let config = ManagerConfig::for_executor(&exec.config().await.unwrap());
        let manager = TaskQueueManager::new(config, exec);
        manager.initialize().await.unwrap();
        manager
    }

    fn echo() -> Arc<dyn TaskHandler> {
        handler_fn(|params| async move { Ok::<_, HandlerError>(Value::Object(params)) })
    }

    #[tokio::test]
    async fn submit_requires_initialize() {
        let exec = executor(1).await;
        let manager = TaskQueueManager::new(ManagerConfig::default(), exec);
        let err = manager
            .submit_task(TaskRequest::new("a", TaskType::Validation, "v"))
            .await
            .unwrap_err();
        assert_eq!(err, QueueError::NotRunning);
    }

    #[tokio::test]
    async fn initialize_requires_a_running_executor() {
        let manager =
            TaskQueueManager::new(ManagerConfig::default(), Arc::new(BoundedExecutor::new()));
        assert_eq!(
            manager.initialize().await,
            Err(QueueError::ExecutorNotRunning)
        );
    }

    #[tokio::test]
    async fn initialize_twice_is_a_noop() {
        let manager = manager(1).await;
        assert!(manager.initialize().await.is_ok());
        assert!(manager.is_running().await);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn completes_a_task() {
        let manager = manager(2).await;
        manager
            .register_task_handler(TaskType::Validation, echo())
            .await;

        let id = manager
            .submit_task(TaskRequest::new("a", TaskType::Validation, "echo").param("x", 1))
            .await
            .unwrap();
        let result = manager
            .wait_for_result(id, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(result.status(), TaskStatus::Completed);
        assert_eq!(result.result(), Some(&json!({ "x": 1 })));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn missing_handler_fails_without_retry() {
        let manager = manager(1).await;
        let id = manager
            .submit_task(TaskRequest::new("a", TaskType::Communication, "ping").max_retries(3))
            .await
            .unwrap();
        let result = manager
            .wait_for_result(id, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(result.status(), TaskStatus::Failed);
        assert_eq!(
            result.error(),
            Some(&TaskError::NoHandlerRegistered {
                task_type: TaskType::Communication
            })
        );
        assert_eq!(result.retry_count(), 0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn resource_exhaustion_is_rejected_at_submission() {
        let manager = manager(1).await;
        let err = manager
            .submit_task(TaskRequest::new("a", TaskType::Analysis, "big").require("memory", 71.0))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            QueueError::ResourceExhausted {
                resource: "memory".into(),
                requested: 71.0,
                limit: 70.0
            }
        );
        assert_eq!(manager.get_queue_statistics().await.submitted, 0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let manager = manager(1).await;
        let id = TaskId::from_ulid(ulid::Ulid::new());
        assert_eq!(
            manager.get_task_status(id).await,
            Err(QueueError::NotFound(id))
        );
        assert!(!manager.cancel_task(id).await);
        assert_eq!(
            manager.wait_for_result(id, Duration::from_millis(10)).await,
            Err(QueueError::NotFound(id))
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn named_registration_rejects_unknown_tags() {
        let manager = manager(1).await;
        assert_eq!(
            manager.register_task_handler_named("analysis", echo()).await,
            Ok(false)
        );
        assert!(matches!(
            manager.register_task_handler_named("telepathy", echo()).await,
            Err(QueueError::UnknownTaskType(_))
        ));
        assert_eq!(
            manager.registered_task_types().await,
            vec![TaskType::Analysis]
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let manager = manager(1).await;
        manager.shutdown().await;
        manager.shutdown().await;
        assert!(!manager.is_running().await);
        let err = manager
            .submit_task(TaskRequest::new("a", TaskType::Processing, "late"))
            .await
            .unwrap_err();
        assert_eq!(err, QueueError::NotRunning);
    }

    #[tokio::test]
    async fn shutdown_finishes_running_work_and_cancels_the_rest() {
        let exec = executor(1).await;
        let mut config = ManagerConfig::for_executor(&exec.config().await.unwrap());
        config.max_concurrent_tasks = 1;
        config.ceiling_backoff = Duration::from_millis(10);
        let manager = TaskQueueManager::new(config, exec);
        manager.initialize().await.unwrap();
        manager
            .register_task_handler(
                TaskType::Processing,
                handler_fn(|_| async {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    Ok::<_, HandlerError>(Value::Null)
                }),
            )
            .await;

        let mut ids = Vec::new();
        for n in 0..3 {
            ids.push(
                manager
                    .submit_task(TaskRequest::new("a", TaskType::Processing, format!("job-{n}")))
                    .await
                    .unwrap(),
            );
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.shutdown().await;

        let mut statuses = Vec::new();
        for id in &ids {
            let snapshot = manager.get_task_status(*id).await.unwrap();
            assert!(snapshot.is_terminal());
            statuses.push(snapshot.status());
        }
        assert_eq!(statuses[0], TaskStatus::Completed);
        let shut_down = manager.get_task_status(ids[2]).await.unwrap();
        assert_eq!(shut_down.status(), TaskStatus::Cancelled);
        assert_eq!(
            shut_down.as_result().and_then(ResultRecord::error),
            Some(&TaskError::Shutdown)
        );
    }

    #[tokio::test]
    async fn fixed_clock_stamps_records() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let clock = Arc::new(FixedClock::new(at));
        let exec = executor(1).await;
        let manager = TaskQueueManager::with_ports(
            ManagerConfig::for_executor(&exec.config().await.unwrap()),
            exec,
            clock.clone(),
            Arc::new(UlidGenerator::new(clock)),
        );
        manager.initialize().await.unwrap();
        manager
            .register_task_handler(TaskType::Processing, echo())
            .await;

        let id = manager
            .submit_task(TaskRequest::new("a", TaskType::Processing, "p").priority(Priority::High))
            .await
            .unwrap();
        assert_eq!(id.as_ulid().timestamp_ms(), at.timestamp_millis() as u64);

        let result = manager
            .wait_for_result(id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(result.completed_at(), at);
        assert_eq!(result.priority(), Priority::High);
        manager.shutdown().await;
    }
}
