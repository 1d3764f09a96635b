use std::time::Duration;

use crate::packet::Timestamp;

pub fn is_expired(now: Timestamp, last_seen: Timestamp, ttl: Duration) -> bool {
    now.saturating_since(last_seen) > ttl
}

/// Capture-time clock: the largest timestamp observed so far.
///
/// Out-of-order timestamps never move it backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingClock {
    now: Timestamp,
}

impl ProcessingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Returns `true` when `timestamp` moved the clock forward.
    pub fn observe(&mut self, timestamp: Timestamp) -> bool {
        if timestamp > self.now {
            self.now = timestamp;
            true
        } else {
            false
        }
    }
}
