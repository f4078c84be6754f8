use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Priority;
use crate::executor::ExecutorStats;

/// Point-in-time view of the manager, for dashboards and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatistics {
    pub initialized: bool,
    pub uptime: Duration,
    pub submitted: u64,
    pub completed: u64,
    /// FAILED and TIMEOUT terminal states.
    pub failed: u64,
    pub cancelled: u64,
    pub retried: u64,
    pub active: usize,
    pub finished: usize,
    pub queue_sizes: BTreeMap<Priority, usize>,
    pub scheduled_retries: usize,
    pub current_concurrent: usize,
    pub peak_concurrent: usize,
    pub max_concurrent: usize,
    pub success_rate: f64,
    pub throughput_per_minute: f64,
    pub executor: ExecutorStats,
}

/// `completed / max(1, completed + failed)`.
pub(crate) fn success_rate(completed: u64, failed: u64) -> f64 {
    completed as f64 / (completed + failed).max(1) as f64
}

/// Completed tasks per minute, with uptime floored at one minute.
pub(crate) fn throughput_per_minute(completed: u64, uptime: Duration) -> f64 {
    completed as f64 / (uptime.as_secs_f64() / 60.0).max(1.0)
}
