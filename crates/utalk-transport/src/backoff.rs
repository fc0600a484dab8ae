//! Reconnection backoff policy.

use std::time::Duration;

/// Exponential backoff with jitter, bounded by a maximum delay and a
/// maximum attempt count.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl Backoff {
    /// Create a policy from the configured bounds.
    pub fn new(base: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
        }
    }

    /// Maximum number of automatic attempts before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether the given 1-based attempt is still within budget.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay before the given 1-based attempt.
    ///
    /// Doubles per attempt from the base, capped at the maximum, with up to
    /// 25% random jitter added so simultaneous clients do not stampede.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let scaled = self
            .base
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        let jitter_ms = (scaled.as_millis() as u64 / 4).max(1);
        scaled + Duration::from_millis(rand::random::<u64>() % jitter_ms)
    }
}
