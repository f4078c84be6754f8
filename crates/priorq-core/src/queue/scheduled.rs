use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tokio::time::Instant;

use crate::domain::TaskId;

/// Retry waiting for its back-off to elapse.
///
/// Reverse ordering so `BinaryHeap` acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledRetry {
    due: Instant,
    task_id: TaskId,
}

impl PartialOrd for ScheduledRetry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledRetry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScheduledRetries {
    heap: BinaryHeap<ScheduledRetry>,
}

impl ScheduledRetries {
    pub(crate) fn push(&mut self, due: Instant, task_id: TaskId) {
        self.heap.push(ScheduledRetry { due, task_id });
    }

    /// Pop the earliest entry if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<TaskId> {
        if self.heap.peek()?.due > now {
            return None;
        }
        self.heap.pop().map(|entry| entry.task_id)
    }

    pub(crate) fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.due)
    }

    /// Drop every entry for `task_id`.
    pub(crate) fn remove(&mut self, task_id: TaskId) -> bool {
        let before = self.heap.len();
        self.heap.retain(|entry| entry.task_id != task_id);
        self.heap.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}
