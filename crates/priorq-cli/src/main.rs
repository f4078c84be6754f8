use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use priorq_core::{
    BoundedExecutor, ExecutorConfig, HandlerError, ManagerConfig, Priority, TaskHandler,
    TaskParams, TaskQueueManager, TaskRequest, TaskType, handler_fn, typed_handler,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const RESULT_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ComputeParams {
    operation: String,
    #[serde(default)]
    values: Vec<f64>,
    #[serde(default)]
    n: u32,
}

fn fibonacci(n: u32) -> Result<u64, HandlerError> {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a
            .checked_add(b)
            .ok_or_else(|| HandlerError::invalid_params(format!("fibonacci({n}) overflows")))?;
        a = b;
        b = next;
    }
    Ok(a)
}

fn computational() -> Arc<dyn TaskHandler> {
    typed_handler(|p: ComputeParams| async move {
        match p.operation.as_str() {
            "add" => Ok(json!(p.values.iter().sum::<f64>())),
            "multiply" => Ok(json!(p.values.iter().product::<f64>())),
            "fibonacci" => fibonacci(p.n).map(|v| json!(v)),
            other => Err(HandlerError::invalid_params(format!(
                "unsupported operation '{other}'"
            ))),
        }
    })
}

fn numbers(params: &TaskParams) -> Result<Vec<f64>, HandlerError> {
    params
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| HandlerError::invalid_params("'data' must be an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| HandlerError::invalid_params(format!("not a number: {v}")))
        })
        .collect()
}

fn analyse(params: TaskParams) -> Result<Value, HandlerError> {
    let data = numbers(&params)?;
    if data.is_empty() {
        return Err(HandlerError::invalid_params("'data' is empty"));
    }
    let count = data.len() as f64;

    match params.get("analysis_type").and_then(Value::as_str) {
        Some("statistics") => {
            let mean = data.iter().sum::<f64>() / count;
            let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count;
            let min = data.iter().copied().fold(f64::INFINITY, f64::min);
            let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Ok(json!({
                "count": data.len(),
                "mean": mean,
                "min": min,
                "max": max,
                "std_dev": variance.sqrt(),
            }))
        }
        Some("trend") => {
            let (first, last) = (data[0], data[data.len() - 1]);
            let trend = if last > first * 1.1 {
                "increasing"
            } else if last < first * 0.9 {
                "decreasing"
            } else {
                "stable"
            };
            Ok(json!({ "trend": trend, "first": first, "last": last }))
        }
        other => Err(HandlerError::invalid_params(format!(
            "unsupported analysis_type {other:?}"
        ))),
    }
}

fn validate(params: TaskParams) -> Result<Value, HandlerError> {
    let data = params.get("data").unwrap_or(&Value::Null);
    match params.get("validation_type").and_then(Value::as_str) {
        Some("email") => {
            let valid = data.as_str().is_some_and(|s| {
                s.split_once('@')
                    .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'))
            });
            Ok(json!({ "valid": valid, "validation_type": "email" }))
        }
        Some("basic") | None => Ok(json!({ "valid": !data.is_null(), "validation_type": "basic" })),
        Some(other) => Err(HandlerError::invalid_params(format!(
            "unsupported validation_type '{other}'"
        ))),
    }
}

/// Sorts `data`, failing the first `remaining_failures` calls.
struct FlakySorter {
    remaining_failures: AtomicU32,
}

impl FlakySorter {
    fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl TaskHandler for FlakySorter {
    async fn handle(&self, params: TaskParams) -> Result<Value, HandlerError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(HandlerError::failed(format!(
                "intentional failure (left={left})"
            )));
        }

        let mut data = numbers(&params)?;
        data.sort_by(f64::total_cmp);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(json!({ "sorted": data }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let exec_config = ExecutorConfig::from_env()?;
    let manager_config = ManagerConfig::from_env(&exec_config)?;

    let executor = Arc::new(BoundedExecutor::new());
    executor.initialize(exec_config).await?;

    let manager = TaskQueueManager::new(manager_config, Arc::clone(&executor));
    manager.initialize().await?;

    manager
        .register_task_handler(TaskType::Computational, computational())
        .await;
    manager
        .register_task_handler(
            TaskType::Analysis,
            handler_fn(|params| async move { analyse(params) }),
        )
        .await;
    manager
        .register_task_handler(
            TaskType::Validation,
            handler_fn(|params| async move { validate(params) }),
        )
        .await;
    manager
        .register_task_handler(TaskType::Processing, Arc::new(FlakySorter::new(2)))
        .await;
    info!(types = ?manager.registered_task_types().await, "handlers registered");

    let series = json!([12.0, 15.5, 14.0, 18.25, 21.0]);
    let stats_task = manager
        .submit_task(
            TaskRequest::new("agent-analytics", TaskType::Analysis, "series statistics")
                .params(json!({ "analysis_type": "statistics", "data": series }))
                .priority(Priority::Low),
        )
        .await?;

    let requests = vec![
        TaskRequest::new("agent-math", TaskType::Computational, "sum")
            .params(json!({ "operation": "add", "values": [1, 2, 3] }))
            .priority(Priority::Critical),
        TaskRequest::new("agent-math", TaskType::Computational, "fibonacci")
            .params(json!({ "operation": "fibonacci", "n": 40 })),
        TaskRequest::new("agent-math", TaskType::Computational, "unsupported")
            .params(json!({ "operation": "divide", "values": [1, 0] }))
            .priority(Priority::High),
        TaskRequest::new("agent-intake", TaskType::Validation, "email check")
            .params(json!({ "validation_type": "email", "data": "ops@example.org" })),
        TaskRequest::new("agent-intake", TaskType::Processing, "sort readings")
            .params(json!({ "data": [5, 3, 9, 1] }))
            .require("cpu", 25.0)
            .max_retries(3),
    ];

    let mut ids = vec![stats_task];
    for request in requests {
        ids.push(manager.submit_task(request).await?);
    }

    // the gate only passes once the dependency has COMPLETED
    manager.wait_for_result(stats_task, RESULT_WAIT).await?;
    ids.push(
        manager
            .submit_task(
                TaskRequest::new("agent-analytics", TaskType::Analysis, "series trend")
                    .params(json!({ "analysis_type": "trend", "data": series }))
                    .priority(Priority::Urgent)
                    .depends_on(stats_task),
            )
            .await?,
    );

    for id in ids {
        match manager.wait_for_result(id, RESULT_WAIT).await {
            Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
            Err(err) => warn!(task_id = %id, error = %err, "no result"),
        }
    }

    for agent in ["agent-math", "agent-analytics", "agent-intake"] {
        info!(agent, tasks = manager.get_agent_tasks(agent).await.len(), "agent summary");
    }

    let stats = manager.get_queue_statistics().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    manager.shutdown().await;
    executor.shutdown(true).await;
    Ok(())
}
