//! IdGenerator port.
//!
//! Task IDs are ULIDs built from the injected clock plus 80 random bits, so
//! a `FixedClock` gives IDs with a deterministic timestamp part.

use ulid::Ulid;

use crate::domain::TaskId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        TaskId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_task_id();
        let id2 = id_gen.generate_task_id();
        let id3 = id_gen.generate_task_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp_part() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_task_id();
        let id2 = id_gen.generate_task_id();

        // random part still differs
        assert_ne!(id1, id2);

        assert_eq!(id1.as_ulid().timestamp_ms(), id2.as_ulid().timestamp_ms());
        assert_eq!(
            id1.as_ulid().timestamp_ms(),
            fixed_time.timestamp_millis() as u64
        );
    }

    #[test]
    fn generated_ids_display_with_task_prefix() {
        let id = UlidGenerator::new(SystemClock).generate_task_id();
        assert!(id.to_string().starts_with("task-"));
    }
}
