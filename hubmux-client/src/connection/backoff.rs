//! Reconnect delay policy

use std::time::Duration;

/// Default delay before the first reconnect attempt
pub const DEFAULT_BASE: Duration = Duration::from_millis(1000);

/// Default upper bound on the reconnect delay
pub const DEFAULT_MAX: Duration = Duration::from_millis(30_000);

/// Exponential backoff: the delay doubles after every failed attempt, is
/// capped at `max`, and returns to `base` after a successful connect.
///
/// Invariant: `base <= current <= max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectPolicy {
    /// `max` below `base` is raised to `base`
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay to wait before the next attempt; doubles the following one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to `base` after a successful connect
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_MAX)
    }
}
