//! Task identifiers.
//!
//! IDs are ULIDs: they sort by creation time and can be generated without
//! coordination. `Display` adds a `task-` prefix, and `FromStr` accepts both
//! the prefixed and the bare form so IDs can round-trip through callers that
//! only hold strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

const PREFIX: &str = "task-";

/// Identifier of a submitted task.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Ulid);

impl TaskId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid task id '{0}'")]
pub struct ParseTaskIdError(String);

impl FromStr for TaskId {
    type Err = ParseTaskIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let raw = raw.strip_prefix(PREFIX).unwrap_or(raw);
        Ulid::from_string(raw)
            .map(TaskId)
            .map_err(|_| ParseTaskIdError(s.to_string()))
    }
}
