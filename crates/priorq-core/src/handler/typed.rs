//! Typed handlers: decode params into `P`, encode the `R` output.
//!
//! `TypedHandler<P, R, F>` is type-erased into `dyn TaskHandler`, so typed
//! and untyped handlers share one registry.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{HandlerError, TaskHandler};
use crate::domain::TaskParams;

pub struct TypedHandler<P, R, F> {
    f: F,
    _marker: PhantomData<fn(P) -> R>,
}

impl<P, R, F> TypedHandler<P, R, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<P, R, F, Fut> TaskHandler for TypedHandler<P, R, F>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, HandlerError>> + Send,
{
    async fn handle(&self, params: TaskParams) -> Result<Value, HandlerError> {
        let input: P = serde_json::from_value(Value::Object(params))
            .map_err(|e| HandlerError::InvalidParams(format!("json decode: {e}")))?;
        let output = (self.f)(input).await?;
        serde_json::to_value(output)
            .map_err(|e| HandlerError::Failed(format!("json encode: {e}")))
    }
}

pub fn typed_handler<P, R, F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
{
    Arc::new(TypedHandler::<P, R, F>::new(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct SumParams {
        values: Vec<f64>,
    }

    #[derive(Serialize)]
    struct SumOutput {
        total: f64,
        count: usize,
    }

    fn summer() -> Arc<dyn TaskHandler> {
        typed_handler(|p: SumParams| async move {
            Ok::<_, HandlerError>(SumOutput {
                total: p.values.iter().sum(),
                count: p.values.len(),
            })
        })
    }

    fn params(v: Value) -> TaskParams {
        match v {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn decodes_and_encodes() {
        let out = summer()
            .handle(params(json!({ "values": [1, 2, 3] })))
            .await
            .unwrap();
        assert_eq!(out, json!({ "total": 6.0, "count": 3 }));
    }

    #[tokio::test]
    async fn bad_params_are_invalid_params() {
        let err = summer()
            .handle(params(json!({ "values": "nope" })))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidParams(_)));
    }
}
