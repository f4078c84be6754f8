//! priorq-core
//!
//! In-process priority job queue and bounded execution engine.
//!
//! - **domain**: IDs, priorities, task/result records, per-task errors
//! - **handler**: the `TaskHandler` trait, closure and typed adapters, registry
//! - **executor**: `BoundedExecutor`, fixed slot pool with per-call deadlines
//! - **queue**: priority lanes, scheduled retries, `RetryPolicy`, `ResourceLimits`
//! - **manager**: `TaskQueueManager`, submission, worker loops, statistics
//! - **ports**: clock and ID generation
//!
//! ```ignore
//! let executor = Arc::new(BoundedExecutor::new());
//! executor.initialize(ExecutorConfig::default()).await?;
//!
//! let manager = TaskQueueManager::new(ManagerConfig::default(), Arc::clone(&executor));
//! manager.initialize().await?;
//! manager.register_task_handler(TaskType::Computational, handler).await;
//!
//! let id = manager
//!     .submit_task(TaskRequest::new("agent-1", TaskType::Computational, "sum")
//!         .params(json!({ "operation": "add", "values": [1, 2, 3] })))
//!     .await?;
//! let result = manager.wait_for_result(id, Duration::from_secs(5)).await?;
//! ```

mod config;

pub mod domain;
pub mod error;
pub mod executor;
pub mod handler;
pub mod manager;
pub mod ports;
pub mod queue;

pub use domain::{
    AttemptRecord, Priority, ResultRecord, TaskError, TaskId, TaskMetadata, TaskParams,
    TaskRecord, TaskRequest, TaskSnapshot, TaskStatus, TaskType,
};
pub use error::{ConfigError, ExecError, QueueError};
pub use executor::{BoundedExecutor, ExecutorConfig, ExecutorStats};
pub use handler::{HandlerError, HandlerRegistry, TaskHandler, handler_fn, typed_handler};
pub use manager::{CeilingPolicy, ManagerConfig, QueueStatistics, TaskQueueManager};
pub use queue::{ResourceLimits, RetryPolicy};
