//! Task handlers.
//!
//! A handler receives the task's parameter map and returns an opaque JSON
//! payload. Failures are values (`HandlerError`), never panics; the executor
//! still catches a panic and reports it as a failed attempt.

mod registry;
mod typed;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::TaskParams;

pub use registry::HandlerRegistry;
pub use typed::{TypedHandler, typed_handler};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        HandlerError::InvalidParams(message.into())
    }
}

/// Executes one task type.
///
/// ```ignore
/// struct Summer;
///
/// #[async_trait]
/// impl TaskHandler for Summer {
///     async fn handle(&self, params: TaskParams) -> Result<Value, HandlerError> {
///         let values = params.get("values").and_then(Value::as_array)
///             .ok_or_else(|| HandlerError::invalid_params("missing values"))?;
///         Ok(json!(values.iter().filter_map(Value::as_f64).sum::<f64>()))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, params: TaskParams) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`TaskHandler`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn handle(&self, params: TaskParams) -> Result<Value, HandlerError> {
        (self.f)(params).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(TaskParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}
