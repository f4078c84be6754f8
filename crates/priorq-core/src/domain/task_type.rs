//! The fixed set of task types handlers can be registered for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Computational,
    Validation,
    Processing,
    Analysis,
    Communication,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::Computational,
        TaskType::Validation,
        TaskType::Processing,
        TaskType::Analysis,
        TaskType::Communication,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Computational => "computational",
            TaskType::Validation => "validation",
            TaskType::Processing => "processing",
            TaskType::Analysis => "analysis",
            TaskType::Communication => "communication",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task type tag that is not one of [`TaskType::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task type '{0}'")]
pub struct UnknownTaskType(pub String);

impl FromStr for TaskType {
    type Err = UnknownTaskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownTaskType(s.to_string()))
    }
}
