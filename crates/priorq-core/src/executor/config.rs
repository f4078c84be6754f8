use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{env_lookup, parse_millis, parse_var};
use crate::error::ConfigError;

/// Bounded executor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of execution slots.
    pub max_workers: usize,
    /// Deadline applied when `execute` is called without one.
    pub default_timeout: Duration,
    /// Retry budget the manager inherits as its default.
    pub max_retries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            default_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// One slot per available core, falling back to 4.
fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

impl ExecutorConfig {
    /// Defaults overridden by `PRIORQ_MAX_WORKERS`, `PRIORQ_EXEC_TIMEOUT_MS`
    /// and `PRIORQ_MAX_RETRIES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, "PRIORQ_MAX_WORKERS")? {
            config.max_workers = v;
        }
        if let Some(v) = parse_millis(&lookup, "PRIORQ_EXEC_TIMEOUT_MS")? {
            config.default_timeout = v;
        }
        if let Some(v) = parse_var(&lookup, "PRIORQ_MAX_RETRIES")? {
            config.max_retries = v;
        }
        Ok(config)
    }
}
