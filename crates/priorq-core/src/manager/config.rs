use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{env_lookup, parse_millis, parse_var};
use crate::error::ConfigError;
use crate::executor::ExecutorConfig;
use crate::queue::{ResourceLimits, RetryPolicy};

/// Where a task goes when a worker bounces it off the concurrency ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeilingPolicy {
    /// Back of its lane; later arrivals of the same priority overtake it.
    #[default]
    RequeueBack,
    /// Front of its lane; FIFO order is kept.
    RequeueFront,
}

impl fmt::Display for CeilingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CeilingPolicy::RequeueBack => "back",
            CeilingPolicy::RequeueFront => "front",
        })
    }
}

impl FromStr for CeilingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "back" | "requeue_back" => Ok(CeilingPolicy::RequeueBack),
            "front" | "requeue_front" => Ok(CeilingPolicy::RequeueFront),
            other => Err(format!("expected 'back' or 'front', got '{other}'")),
        }
    }
}

/// Task queue manager settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Worker loops spawned per priority level.
    pub workers_per_priority: usize,
    /// Tasks allowed in RUNNING at once across all worker loops.
    pub max_concurrent_tasks: usize,
    pub default_timeout: Duration,
    pub default_max_retries: u32,
    pub resource_limits: ResourceLimits,
    pub retry_policy: RetryPolicy,
    pub ceiling_policy: CeilingPolicy,
    /// How long a bounced worker sleeps before scanning again.
    pub ceiling_backoff: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::for_executor(&ExecutorConfig::default())
    }
}

impl ManagerConfig {
    /// Defaults sized from the executor the manager will drive.
    pub fn for_executor(executor: &ExecutorConfig) -> Self {
        let workers = executor.max_workers.max(1);
        Self {
            workers_per_priority: workers,
            max_concurrent_tasks: workers.saturating_mul(2),
            default_timeout: Duration::from_secs(30),
            default_max_retries: executor.max_retries,
            resource_limits: ResourceLimits::default(),
            retry_policy: RetryPolicy::default(),
            ceiling_policy: CeilingPolicy::default(),
            ceiling_backoff: Duration::from_millis(100),
        }
    }

    /// [`for_executor`](Self::for_executor) defaults overridden by `PRIORQ_*`
    /// variables.
    pub fn from_env(executor: &ExecutorConfig) -> Result<Self, ConfigError> {
        Self::from_lookup(executor, env_lookup)
    }

    pub fn from_lookup<L>(executor: &ExecutorConfig, lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::for_executor(executor);
        if let Some(v) = parse_var(&lookup, "PRIORQ_WORKERS_PER_PRIORITY")? {
            config.workers_per_priority = v;
        }
        if let Some(v) = parse_var(&lookup, "PRIORQ_MAX_CONCURRENT_TASKS")? {
            config.max_concurrent_tasks = v;
        }
        if let Some(v) = parse_millis(&lookup, "PRIORQ_DEFAULT_TIMEOUT_MS")? {
            config.default_timeout = v;
        }
        if let Some(v) = parse_var(&lookup, "PRIORQ_DEFAULT_MAX_RETRIES")? {
            config.default_max_retries = v;
        }
        if let Some(base) = parse_millis(&lookup, "PRIORQ_RETRY_BASE_DELAY_MS")? {
            let multiplier = parse_var(&lookup, "PRIORQ_RETRY_MULTIPLIER")?.unwrap_or(1.0);
            config.retry_policy = if multiplier == 1.0 {
                RetryPolicy::fixed(base)
            } else {
                RetryPolicy::exponential(base, multiplier)
            };
        }
        if let Some(v) = parse_var(&lookup, "PRIORQ_CEILING_POLICY")? {
            config.ceiling_policy = v;
        }
        if let Some(v) = parse_millis(&lookup, "PRIORQ_CEILING_BACKOFF_MS")? {
            config.ceiling_backoff = v;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn executor(max_workers: usize) -> ExecutorConfig {
        ExecutorConfig {
            max_workers,
            default_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }

    #[test]
    fn defaults_follow_the_executor() {
        let config = ManagerConfig::for_executor(&executor(4));
        assert_eq!(config.workers_per_priority, 4);
        assert_eq!(config.max_concurrent_tasks, 8);
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert_eq!(config.ceiling_policy, CeilingPolicy::RequeueBack);
        assert_eq!(config.ceiling_backoff, Duration::from_millis(100));
        assert!(config.retry_policy.is_immediate());
        assert_eq!(config.resource_limits.limit("cpu"), Some(80.0));
    }

    #[test]
    fn unset_env_keeps_the_executor_sized_defaults() {
        let exec = executor(3);
        let config = ManagerConfig::from_lookup(&exec, |_| None).unwrap();
        assert_eq!(config, ManagerConfig::for_executor(&exec));
        assert_eq!(config.max_concurrent_tasks, 6);
    }

    #[test]
    fn env_overrides() {
        let config = ManagerConfig::from_lookup(&executor(2), |key| {
            let v = match key {
                "PRIORQ_MAX_CONCURRENT_TASKS" => "1",
                "PRIORQ_CEILING_POLICY" => "front",
                "PRIORQ_RETRY_BASE_DELAY_MS" => "20",
                "PRIORQ_RETRY_MULTIPLIER" => "3",
                _ => return None,
            };
            Some(v.to_string())
        })
        .unwrap();
        assert_eq!(config.max_concurrent_tasks, 1);
        assert_eq!(config.workers_per_priority, 2);
        assert_eq!(config.ceiling_policy, CeilingPolicy::RequeueFront);
        assert_eq!(config.retry_policy.next_delay(2), Duration::from_millis(60));
    }

    #[test]
    fn bad_ceiling_policy_is_a_config_error() {
        let err = ManagerConfig::from_lookup(&executor(2), |key| {
            (key == "PRIORQ_CEILING_POLICY").then(|| "sideways".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("sideways"));
    }

    #[rstest]
    #[case("back", CeilingPolicy::RequeueBack)]
    #[case("FRONT", CeilingPolicy::RequeueFront)]
    #[case("requeue_front", CeilingPolicy::RequeueFront)]
    fn ceiling_policy_parses(#[case] raw: &str, #[case] expected: CeilingPolicy) {
        assert_eq!(raw.parse::<CeilingPolicy>().unwrap(), expected);
    }
}
