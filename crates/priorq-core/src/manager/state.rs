//! Queue state guarded by the manager's lock.
//!
//! Everything here is synchronous: worker loops take the lock, make one
//! decision and release it before awaiting anything.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;

use super::config::{CeilingPolicy, ManagerConfig};
use crate::domain::{
    AttemptRecord, Priority, ResultRecord, TaskError, TaskId, TaskParams, TaskRecord,
    TaskSnapshot, TaskStatus, TaskType,
};
use crate::queue::{PriorityLanes, ScheduledRetries};

/// Everything a worker needs to run one attempt without holding the lock.
#[derive(Debug, Clone)]
pub(crate) struct RunTicket {
    pub(crate) task_id: TaskId,
    pub(crate) task_type: TaskType,
    pub(crate) priority: Priority,
    pub(crate) params: TaskParams,
    pub(crate) timeout: Duration,
    pub(crate) attempt: u32,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) started: Instant,
}

#[derive(Debug)]
pub(crate) enum Dispatch {
    Run(RunTicket),
    /// At the concurrency ceiling; the popped task went back on its lane.
    Saturated,
    /// Nothing runnable. `next_due` is the earliest scheduled retry.
    Idle { next_due: Option<Instant> },
}

/// What happened to a task after an attempt was reported.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Completion {
    Completed,
    Retrying { retry: u32, delay: Duration },
    Finished(TaskStatus),
    /// The task was cancelled while running; the outcome is dropped.
    Discarded,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Counters {
    pub(crate) submitted: u64,
    pub(crate) completed: u64,
    pub(crate) failed: u64,
    pub(crate) cancelled: u64,
    pub(crate) retried: u64,
    pub(crate) concurrent: usize,
    pub(crate) peak_concurrent: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ManagerState {
    lanes: PriorityLanes,
    scheduled: ScheduledRetries,
    active: HashMap<TaskId, TaskRecord>,
    finished: HashMap<TaskId, ResultRecord>,
    by_requester: HashMap<String, Vec<TaskId>>,
    counters: Counters,
    finalized: bool,
    pub(crate) running: bool,
    pub(crate) initialized_at: Option<Instant>,
}

impl ManagerState {
    pub(crate) fn contains(&self, task_id: &TaskId) -> bool {
        self.active.contains_key(task_id) || self.finished.contains_key(task_id)
    }

    /// PENDING -> QUEUED on the task's lane.
    pub(crate) fn admit(&mut self, mut record: TaskRecord, now: DateTime<Utc>) {
        let task_id = record.task_id;
        record.mark_queued(now);
        self.lanes.push_back(record.priority, task_id);
        self.by_requester
            .entry(record.requester_id.clone())
            .or_default()
            .push(task_id);
        self.active.insert(task_id, record);
        self.counters.submitted += 1;
    }

    /// Pick the next task to run.
    ///
    /// Promotes due retries, pops the most urgent lane, applies the
    /// concurrency ceiling and the dependency gate. Tasks failing the gate
    /// are finalized here and the scan continues.
    pub(crate) fn next_dispatch(
        &mut self,
        now: DateTime<Utc>,
        clock: Instant,
        config: &ManagerConfig,
    ) -> Dispatch {
        self.promote_due(now, clock);

        loop {
            let Some((priority, task_id)) = self.lanes.pop_highest() else {
                return Dispatch::Idle {
                    next_due: self.scheduled.next_due(),
                };
            };
            let Some(record) = self.active.get(&task_id) else {
                continue;
            };
            if record.status != TaskStatus::Queued {
                continue;
            }

            if self.counters.concurrent >= config.max_concurrent_tasks.max(1) {
                match config.ceiling_policy {
                    CeilingPolicy::RequeueBack => self.lanes.push_back(priority, task_id),
                    CeilingPolicy::RequeueFront => self.lanes.push_front(priority, task_id),
                }
                return Dispatch::Saturated;
            }

            let unmet = self.unmet_dependencies(&record.dependencies);
            if !unmet.is_empty() {
                self.finalize(
                    task_id,
                    TaskStatus::Failed,
                    None,
                    Some(TaskError::DependenciesNotSatisfied { task_ids: unmet }),
                    Duration::ZERO,
                    now,
                );
                continue;
            }

            let Some(record) = self.active.get_mut(&task_id) else {
                continue;
            };
            let attempt = record.start_attempt(now);
            self.counters.concurrent += 1;
            self.counters.peak_concurrent =
                self.counters.peak_concurrent.max(self.counters.concurrent);

            return Dispatch::Run(RunTicket {
                task_id,
                task_type: record.task_type,
                priority,
                params: record.params.clone(),
                timeout: record.timeout,
                attempt,
                started_at: now,
                started: clock,
            });
        }
    }

    fn promote_due(&mut self, now: DateTime<Utc>, clock: Instant) {
        while let Some(task_id) = self.scheduled.pop_due(clock) {
            // finalized while waiting: no longer active
            if let Some(record) = self.active.get_mut(&task_id)
                && record.status == TaskStatus::Pending
            {
                record.mark_queued(now);
                self.lanes.push_back(record.priority, task_id);
            }
        }
    }

    /// Dependencies without a COMPLETED result, in declaration order.
    fn unmet_dependencies(&self, dependencies: &[TaskId]) -> Vec<TaskId> {
        dependencies
            .iter()
            .filter(|dep| {
                self.finished
                    .get(dep)
                    .is_none_or(|result| result.status() != TaskStatus::Completed)
            })
            .copied()
            .collect()
    }

    /// Record the outcome of the attempt described by `ticket`.
    pub(crate) fn complete(
        &mut self,
        ticket: &RunTicket,
        outcome: Result<Value, TaskError>,
        now: DateTime<Utc>,
        clock: Instant,
        config: &ManagerConfig,
    ) -> Completion {
        self.counters.concurrent = self.counters.concurrent.saturating_sub(1);

        let Some(record) = self.active.get_mut(&ticket.task_id) else {
            return Completion::Discarded;
        };
        if record.status != TaskStatus::Running {
            return Completion::Discarded;
        }
        let elapsed = clock.saturating_duration_since(ticket.started);

        let error = match outcome {
            Ok(value) => {
                record.record_attempt(AttemptRecord::succeeded(
                    ticket.attempt,
                    ticket.started_at,
                    elapsed,
                ));
                self.finalize(
                    ticket.task_id,
                    TaskStatus::Completed,
                    Some(value),
                    None,
                    elapsed,
                    now,
                );
                return Completion::Completed;
            }
            Err(error) => error,
        };

        record.record_attempt(AttemptRecord::failed(
            ticket.attempt,
            ticket.started_at,
            elapsed,
            error.clone(),
        ));

        if error.is_retryable() && record.can_retry() {
            record.schedule_retry(error);
            let retry = record.retry_count;
            let delay = config.retry_policy.next_delay(retry);
            if delay.is_zero() {
                record.mark_queued(now);
                self.lanes.push_back(record.priority, ticket.task_id);
            } else {
                self.scheduled.push(clock + delay, ticket.task_id);
            }
            self.counters.retried += 1;
            return Completion::Retrying { retry, delay };
        }

        let status = if error.is_timeout() && record.max_retries == 0 {
            TaskStatus::Timeout
        } else {
            TaskStatus::Failed
        };
        self.finalize(ticket.task_id, status, None, Some(error), elapsed, now);
        Completion::Finished(status)
    }

    /// Finalize a non-terminal task as CANCELLED. False when the task is
    /// unknown or already terminal.
    pub(crate) fn cancel(&mut self, task_id: TaskId, error: TaskError, now: DateTime<Utc>) -> bool {
        let Some(record) = self.active.get(&task_id) else {
            return false;
        };
        match record.status {
            TaskStatus::Queued => {
                self.lanes.remove(record.priority, task_id);
            }
            TaskStatus::Pending => {
                self.scheduled.remove(task_id);
            }
            _ => {}
        }
        self.finalize(
            task_id,
            TaskStatus::Cancelled,
            None,
            Some(error),
            Duration::ZERO,
            now,
        );
        true
    }

    pub(crate) fn cancel_all(&mut self, error: TaskError, now: DateTime<Utc>) -> usize {
        let mut ids: Vec<TaskId> = self.active.keys().copied().collect();
        ids.sort();
        ids.into_iter()
            .filter(|id| self.cancel(*id, error.clone(), now))
            .count()
    }

    fn finalize(
        &mut self,
        task_id: TaskId,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<TaskError>,
        execution_time: Duration,
        now: DateTime<Utc>,
    ) {
        let Some(record) = self.active.remove(&task_id) else {
            return;
        };
        match status {
            TaskStatus::Completed => self.counters.completed += 1,
            TaskStatus::Failed | TaskStatus::Timeout => self.counters.failed += 1,
            TaskStatus::Cancelled => self.counters.cancelled += 1,
            _ => {}
        }
        let result = record.finish(status, result, error, execution_time, now);
        self.finished.insert(task_id, result);
        self.finalized = true;
    }

    /// True once after any task became terminal.
    pub(crate) fn take_finalized(&mut self) -> bool {
        std::mem::take(&mut self.finalized)
    }

    pub(crate) fn snapshot(&self, task_id: &TaskId) -> Option<TaskSnapshot> {
        if let Some(record) = self.active.get(task_id) {
            return Some(TaskSnapshot::Active(record.clone()));
        }
        self.finished
            .get(task_id)
            .map(|result| TaskSnapshot::Finished(result.clone()))
    }

    pub(crate) fn result(&self, task_id: &TaskId) -> Option<&ResultRecord> {
        self.finished.get(task_id)
    }

    /// Submission order.
    pub(crate) fn requester_snapshots(&self, requester_id: &str) -> Vec<TaskSnapshot> {
        self.by_requester
            .get(requester_id)
            .map(|ids| ids.iter().filter_map(|id| self.snapshot(id)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn has_queued_work(&self) -> bool {
        !self.lanes.is_empty()
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.counters
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn finished_count(&self) -> usize {
        self.finished.len()
    }

    pub(crate) fn queue_depths(&self) -> BTreeMap<Priority, usize> {
        self.lanes.depths()
    }

    pub(crate) fn scheduled_retries(&self) -> usize {
        self.scheduled.len()
    }
}
