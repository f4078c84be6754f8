//! Bounded execution environment.
//!
//! A fixed number of slots (semaphore permits) run task handlers under a
//! per-call deadline that starts when the call is made, so it covers the
//! wait for a slot as well as the run. Each call runs on its own spawned
//! task that owns its permit, so a call abandoned on timeout keeps its slot
//! until the handler actually returns.

mod config;
mod stats;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::TaskParams;
use crate::error::ExecError;
use crate::handler::TaskHandler;

pub use config::ExecutorConfig;
pub use stats::ExecutorStats;

use stats::{SlotGauge, TimingStats};

struct Pool {
    semaphore: Arc<Semaphore>,
    config: ExecutorConfig,
}

/// Shared by reference (`Arc<BoundedExecutor>`); all methods take `&self`.
#[derive(Default)]
pub struct BoundedExecutor {
    pool: Mutex<Option<Pool>>,
    timing: Mutex<TimingStats>,
    gauge: Arc<SlotGauge>,
}

impl BoundedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the slot pool. Allowed again after a shutdown.
    pub async fn initialize(&self, config: ExecutorConfig) -> Result<(), ExecError> {
        if config.max_workers == 0 {
            return Err(ExecError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if config.max_workers > Semaphore::MAX_PERMITS
            || u32::try_from(config.max_workers).is_err()
        {
            return Err(ExecError::InvalidConfig(format!(
                "max_workers {} is too large",
                config.max_workers
            )));
        }

        let mut pool = self.pool.lock().await;
        if pool.is_some() {
            return Err(ExecError::AlreadyRunning);
        }
        info!(
            max_workers = config.max_workers,
            default_timeout = ?config.default_timeout,
            "bounded executor initialized"
        );
        *pool = Some(Pool {
            semaphore: Arc::new(Semaphore::new(config.max_workers)),
            config,
        });
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.pool.lock().await.is_some()
    }

    pub async fn config(&self) -> Option<ExecutorConfig> {
        self.pool.lock().await.as_ref().map(|p| p.config.clone())
    }

    /// Run `handler` in a slot, waiting for one if all are busy.
    ///
    /// The deadline (`timeout`, else the configured default) covers the
    /// wait for a slot plus the handler run. Slots held by abandoned calls
    /// therefore cannot stall later callers past their own deadline.
    pub async fn execute(
        &self,
        handler: Arc<dyn TaskHandler>,
        params: TaskParams,
        timeout: Option<Duration>,
    ) -> Result<Value, ExecError> {
        let (semaphore, deadline) = {
            let pool = self.pool.lock().await;
            let pool = pool.as_ref().ok_or(ExecError::NotRunning)?;
            (
                Arc::clone(&pool.semaphore),
                timeout.unwrap_or(pool.config.default_timeout),
            )
        };

        let expires_at = Instant::now() + deadline;
        self.timing.lock().await.record_submitted();

        let permit = match tokio::time::timeout_at(expires_at, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ExecError::NotRunning),
            Err(_) => {
                self.timing.lock().await.record_timed_out();
                warn!(timeout = ?deadline, "no free slot before the deadline");
                return Err(ExecError::TimedOut(deadline));
            }
        };

        let guard = self.gauge.enter();
        let spawned_at = Instant::now();
        let call = tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            let started = Instant::now();
            let output = handler.handle(params).await;
            (output, started.elapsed())
        });

        // Dropping the JoinHandle on timeout detaches the call; it keeps
        // running and releases its slot when it returns.
        let joined = match tokio::time::timeout_at(expires_at, call).await {
            Ok(joined) => joined,
            Err(_) => {
                self.timing.lock().await.record_timed_out();
                warn!(timeout = ?deadline, "handler timed out");
                return Err(ExecError::TimedOut(deadline));
            }
        };

        match joined {
            Ok((Ok(value), elapsed)) => {
                self.timing.lock().await.record_finished(elapsed, true);
                debug!(elapsed = ?elapsed, "handler completed");
                Ok(value)
            }
            Ok((Err(err), elapsed)) => {
                self.timing.lock().await.record_finished(elapsed, false);
                debug!(elapsed = ?elapsed, error = %err, "handler failed");
                Err(ExecError::ExecutionFailed(err.to_string()))
            }
            Err(join_err) => {
                self.timing
                    .lock()
                    .await
                    .record_finished(spawned_at.elapsed(), false);
                let message = describe_join_error(join_err);
                warn!(error = %message, "handler aborted");
                Err(ExecError::ExecutionFailed(message))
            }
        }
    }

    /// Stop accepting work. With `wait`, block until every slot is back.
    /// Calling it when not running does nothing.
    pub async fn shutdown(&self, wait: bool) {
        let Some(pool) = self.pool.lock().await.take() else {
            return;
        };
        info!(wait, "bounded executor shutting down");

        if wait {
            let all = u32::try_from(pool.config.max_workers).unwrap_or(u32::MAX);
            // Semaphore is fair, so calls already waiting for a slot run first.
            if let Ok(permits) = pool.semaphore.acquire_many(all).await {
                drop(permits);
            }
        }
        pool.semaphore.close();
        info!("bounded executor stopped");
    }

    pub async fn stats(&self) -> ExecutorStats {
        let mut stats = ExecutorStats::default();
        if let Some(pool) = self.pool.lock().await.as_ref() {
            stats.running = true;
            stats.max_workers = pool.config.max_workers;
        }
        self.timing.lock().await.fill(&mut stats);
        stats.active = self.gauge.active();
        stats.peak_concurrent = self.gauge.peak();
        stats
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "handler was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => format!("handler panicked: {}", panic_message(payload.as_ref())),
        Err(err) => err.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
