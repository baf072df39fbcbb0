//! Per-call monotonic timestamp assignment. `TranslationResult.timestamp_ms`
//! must be non-decreasing within a call so the Delivery Bus and Transcript
//! Store can order utterances without a separate sequence field — utterances
//! from the same call are produced one at a time by the Chunker, but two
//! calls racing on the same wall-clock millisecond must not collide.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use dashmap::DashMap;

pub struct MonotonicClock {
    last: DashMap<String, AtomicI64>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: DashMap::new(),
        }
    }

    /// Returns a millisecond timestamp that is strictly greater than the
    /// last one returned for this call, advancing past wall-clock time if
    /// two calls land on the same millisecond.
    pub fn next(&self, call_id: &str) -> u64 {
        let now = Utc::now().timestamp_millis();
        let entry = self
            .last
            .entry(call_id.to_string())
            .or_insert_with(|| AtomicI64::new(0));

        loop {
            let prev = entry.load(Ordering::Relaxed);
            let candidate = if now > prev { now } else { prev + 1 };
            if entry
                .compare_exchange(prev, candidate, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return candidate as u64;
            }
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_strictly_increase_for_same_call() {
        let clock = MonotonicClock::new();
        let a = clock.next("call-1");
        let b = clock.next("call-1");
        let c = clock.next("call-1");
        assert!(b > a);
        assert!(c > b);
    }

    #[test]
    fn calls_are_tracked_independently() {
        let clock = MonotonicClock::new();
        let a1 = clock.next("call-1");
        let b1 = clock.next("call-2");
        let a2 = clock.next("call-1");
        assert!(a2 > a1);
        assert!(b1 > 0);
    }
}
