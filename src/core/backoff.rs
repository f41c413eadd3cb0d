//! Capped exponential reconnect delay

use std::time::Duration;

/// First retry delay
pub const BASE_DELAY: Duration = Duration::from_millis(1_000);
/// Upper bound on any retry delay
pub const MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Reconnect delay policy: `min(base * 2^retry_count, max)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: BASE_DELAY,
            max: MAX_DELAY,
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the next attempt, given the failures counted so far
    pub fn delay(&self, retry_count: u32) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }
}
