use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Executor counters as seen by callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub running: bool,
    pub max_workers: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    /// Calls currently holding a slot.
    pub active: usize,
    pub peak_concurrent: usize,
    pub avg_execution_time: Duration,
    pub min_execution_time: Option<Duration>,
    pub max_execution_time: Option<Duration>,
}

/// Running totals. Only finished calls feed the timing figures; a call that
/// timed out is counted but has no meaningful duration yet.
#[derive(Debug, Default)]
pub(crate) struct TimingStats {
    submitted: u64,
    completed: u64,
    failed: u64,
    timed_out: u64,
    mean_secs: f64,
    min: Option<Duration>,
    max: Option<Duration>,
}

impl TimingStats {
    pub(crate) fn record_submitted(&mut self) {
        self.submitted += 1;
    }

    pub(crate) fn record_finished(&mut self, elapsed: Duration, ok: bool) {
        if ok {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        let n = (self.completed + self.failed) as f64;
        self.mean_secs += (elapsed.as_secs_f64() - self.mean_secs) / n;
        self.min = Some(self.min.map_or(elapsed, |m| m.min(elapsed)));
        self.max = Some(self.max.map_or(elapsed, |m| m.max(elapsed)));
    }

    pub(crate) fn record_timed_out(&mut self) {
        self.timed_out += 1;
    }

    pub(crate) fn fill(&self, stats: &mut ExecutorStats) {
        stats.submitted = self.submitted;
        stats.completed = self.completed;
        stats.failed = self.failed;
        stats.timed_out = self.timed_out;
        stats.avg_execution_time = Duration::from_secs_f64(self.mean_secs.max(0.0));
        stats.min_execution_time = self.min;
        stats.max_execution_time = self.max;
    }
}

/// Active/peak slot counters shared with spawned calls.
#[derive(Debug, Default)]
pub(crate) struct SlotGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SlotGauge {
    pub(crate) fn enter(self: &Arc<Self>) -> ActiveGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ActiveGuard {
            gauge: Arc::clone(self),
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the active count on drop, including when the handler panics.
pub(crate) struct ActiveGuard {
    gauge: Arc<SlotGauge>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.gauge.active.fetch_sub(1, Ordering::SeqCst);
    }
}
