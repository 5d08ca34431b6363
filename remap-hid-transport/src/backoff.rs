//! Reconnect backoff: each failed connect doubles the wait (capped), and
//! a success resets the counter to zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const INITIAL_DELAY_MS: u64 = 50;
const MAX_DELAY_MS: u64 = 5_000;
const MAX_CONSECUTIVE_FAILURES: usize = 10;

pub struct Backoff {
    consecutive_failures: AtomicUsize,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            consecutive_failures: AtomicUsize::new(0),
        }
    }

    /// The delay to wait before the next connect attempt, given how many
    /// attempts have failed in a row so far.
    pub fn next_delay(&self) -> Duration {
        let failures = self.consecutive_failures.load(Ordering::Relaxed) as u32;
        let delay_ms = INITIAL_DELAY_MS.saturating_mul(1u64 << failures.min(16)).min(MAX_DELAY_MS);
        Duration::from_millis(delay_ms)
    }

    pub fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Whether this endpoint has failed to connect enough consecutive
    /// times that the pool should give up on it rather than keep retrying
    /// forever.
    pub fn exhausted(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) >= MAX_CONSECUTIVE_FAILURES
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_failure_and_caps() {
        let backoff = Backoff::new();
        assert_eq!(backoff.next_delay(), Duration::from_millis(INITIAL_DELAY_MS));
        backoff.record_failure();
        assert_eq!(backoff.next_delay(), Duration::from_millis(INITIAL_DELAY_MS * 2));
        for _ in 0..20 {
            backoff.record_failure();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(MAX_DELAY_MS));
    }

    #[test]
    fn success_resets_the_counter() {
        let backoff = Backoff::new();
        backoff.record_failure();
        backoff.record_failure();
        backoff.record_success();
        assert_eq!(backoff.next_delay(), Duration::from_millis(INITIAL_DELAY_MS));
    }

    #[test]
    fn exhausted_after_enough_consecutive_failures() {
        let backoff = Backoff::new();
        for _ in 0..MAX_CONSECUTIVE_FAILURES {
            backoff.record_failure();
        }
        assert!(backoff.exhausted());
    }
}
