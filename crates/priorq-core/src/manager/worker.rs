use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Inner;
use crate::domain::Priority;

/// Worker loops of one manager.
/// - `request_shutdown` stops every loop once its current task is reported
/// - `shutdown_and_join` also waits for them
pub(crate) struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// `per_priority` loops for each priority level. Every loop serves all
    /// lanes, most urgent first; the per-priority count only sets the size.
    pub(crate) fn spawn(per_priority: usize, inner: Arc<Inner>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(per_priority * Priority::COUNT);
        for priority in Priority::DESCENDING {
            for index in 0..per_priority {
                let name = format!("worker-{priority}-{index}");
                let inner = Arc::clone(&inner);
                let rx = shutdown_rx.clone();
                joins.push(tokio::spawn(worker_loop(name, inner, rx)));
            }
        }

        Self { shutdown_tx, joins }
    }

    pub(crate) fn len(&self) -> usize {
        self.joins.len()
    }

    pub(crate) fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub(crate) async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                warn!(error = %err, "worker loop ended abnormally");
            }
        }
    }
}

async fn worker_loop(name: String, inner: Arc<Inner>, mut shutdown_rx: watch::Receiver<bool>) {
    debug!(worker = %name, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // Waiting for work races the shutdown signal; running a task does not.
        let ticket = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            ticket = inner.next_ticket() => ticket,
        };

        inner.run(&name, ticket).await;
    }
    debug!(worker = %name, "worker stopped");
}
