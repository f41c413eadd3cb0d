//! Countdown to the next backend scrape cycle

use std::time::Duration;

/// Interval between backend scrape cycles
pub const SCRAPE_CYCLE: Duration = Duration::from_secs(120);

#[derive(Clone, Debug)]
pub struct ScrapeCountdown {
    cycle_ms: u64,
    target_ms: u64,
    remaining_ms: u64,
}

impl ScrapeCountdown {
    pub fn new(now_ms: u64) -> Self {
        Self::with_cycle(SCRAPE_CYCLE, now_ms)
    }

    pub fn with_cycle(cycle: Duration, now_ms: u64) -> Self {
        let cycle_ms = cycle.as_millis() as u64;
        Self {
            cycle_ms,
            target_ms: now_ms.saturating_add(cycle_ms),
            remaining_ms: cycle_ms,
        }
    }

    /// Restart the full cycle from `now_ms`
    pub fn reset(&mut self, now_ms: u64) {
        self.target_ms = now_ms.saturating_add(self.cycle_ms);
        self.remaining_ms = self.cycle_ms;
    }

    /// Recompute the remaining time; re-arms and returns true on expiry
    pub fn tick(&mut self, now_ms: u64) -> bool {
        self.remaining_ms = self.target_ms.saturating_sub(now_ms);
        if self.remaining_ms == 0 {
            self.target_ms = now_ms.saturating_add(self.cycle_ms);
            return true;
        }
        false
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    /// `m:ss`
    pub fn display(&self) -> String {
        let minutes = self.remaining_ms / 60_000;
        let seconds = (self.remaining_ms % 60_000) / 1_000;
        format!("{minutes}:{seconds:02}")
    }
}
