//! Environment-variable overrides shared by the config structs.
//!
//! Every `from_env` has a `from_lookup` twin taking the variable source as a
//! closure so tests never touch the process environment.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub(crate) fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Parse `key` when set. Blank values count as unset.
pub(crate) fn parse_var<T, L>(lookup: &L, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    L: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        })
}

pub(crate) fn parse_millis<L>(lookup: &L, key: &str) -> Result<Option<Duration>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    Ok(parse_var::<u64, _>(lookup, key)?.map(Duration::from_millis))
}
