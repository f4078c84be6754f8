//! Ports: time and ID generation, swappable for deterministic tests.

pub mod clock;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
