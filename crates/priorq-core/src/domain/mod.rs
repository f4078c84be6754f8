//! Domain model: identifiers, enums, task and result records.

pub mod attempt;
pub mod errors;
pub mod ids;
pub mod priority;
pub mod result;
pub mod status;
pub mod task;
pub mod task_type;

pub use attempt::AttemptRecord;
pub use errors::TaskError;
pub use ids::{ParseTaskIdError, TaskId};
pub use priority::{Priority, UnknownPriority};
pub use result::{ResultRecord, TaskSnapshot};
pub use status::TaskStatus;
pub use task::{ResourceRequirements, TaskMetadata, TaskParams, TaskRecord, TaskRequest};
pub use task_type::{TaskType, UnknownTaskType};
