//! Queue building blocks: priority lanes, scheduled retries, retry policy
//! and resource ceilings.

mod lanes;
mod resources;
mod retry;
mod scheduled;

pub(crate) use lanes::PriorityLanes;
pub(crate) use scheduled::ScheduledRetries;

pub use resources::{ResourceLimits, ResourceShortfall};
pub use retry::RetryPolicy;
