//! Two-speed reconnection backoff.

use std::time::Duration;

/// Retry cadence: `initial` for the first `fast_attempts` failures, then
/// `steady` until a connection succeeds.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    steady: Duration,
    fast_attempts: u32,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, steady: Duration, fast_attempts: u32) -> Self {
        Self {
            initial,
            steady,
            fast_attempts,
            failures: 0,
        }
    }

    /// Count a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        if self.failures <= self.fast_attempts {
            self.initial
        } else {
            self.steady
        }
    }

    /// Forget accumulated failures after a successful connection.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// The next failure still gets the `initial` delay.
    pub fn is_fast(&self) -> bool {
        self.failures < self.fast_attempts
    }
}
