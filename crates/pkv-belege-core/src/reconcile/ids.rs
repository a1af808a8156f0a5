//! Record id generation.

use chrono::Utc;
use rand::Rng;

use crate::models::RecordId;

/// Source of fresh record ids. Injected so tests can assert exact ids.
pub trait IdGenerator {
    fn next_id(&mut self) -> RecordId;
}

/// Width of the random component appended to the millisecond timestamp.
const RANDOM_SPAN: i64 = 1000;

/// Millisecond timestamp combined with a random component.
///
/// Ids stay below 2^53 so they remain exact in any JSON reader. Ids handed
/// out by one generator are strictly increasing, so a single import pass
/// never produces a duplicate even when the clock does not advance.
#[derive(Debug, Default)]
pub struct ClockIdGenerator {
    last: i64,
}

impl ClockIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for ClockIdGenerator {
    fn next_id(&mut self) -> RecordId {
        let millis = Utc::now().timestamp_millis();
        let candidate = millis * RANDOM_SPAN + rand::thread_rng().gen_range(0..RANDOM_SPAN);
        let id = candidate.max(self.last + 1);
        self.last = id;
        RecordId::from(id)
    }
}

/// Counts up from a starting value.
#[derive(Debug)]
pub struct SequentialIds {
    next: i64,
}

impl SequentialIds {
    pub fn starting_at(next: i64) -> Self {
        Self { next }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> RecordId {
        let id = self.next;
        self.next += 1;
        RecordId::from(id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_clock_ids_are_unique_in_a_burst() {
        let mut ids = ClockIdGenerator::new();
        let generated: HashSet<RecordId> = (0..5000).map(|_| ids.next_id()).collect();
        assert_eq!(generated.len(), 5000);
    }

    #[test]
    fn test_clock_ids_are_exact_in_json() {
        let mut ids = ClockIdGenerator::new();
        let id = ids.next_id();
        let value: i64 = id.as_str().parse().unwrap();
        assert!(value < (1_i64 << 53));
    }

    #[test]
    fn test_sequential_ids() {
        let mut ids = SequentialIds::starting_at(100);
        assert_eq!(ids.next_id(), RecordId::from(100));
        assert_eq!(ids.next_id(), RecordId::from(101));
    }
}
