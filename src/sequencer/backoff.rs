//! Bounded retry with exponential backoff
//!
//! Attempt k (1-based) is followed, if it fails and is not the last one,
//! by a wait of `base · 2^(k-1)`. With N attempts the total wait before
//! giving up is `base · (2^(N-1) - 1)`: there is no wait after the final
//! attempt. Delays are exact; there is no jitter.

use crate::config::ServiceSettings;
use std::time::Duration;

/// Retry budget for one service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound on a single probe call
    pub probe_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, probe_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            probe_timeout,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.base_delay, self.max_attempts)
    }
}

impl From<ServiceSettings> for RetryPolicy {
    fn from(settings: ServiceSettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.probe_timeout_ms),
        )
    }
}

/// Doubling delay series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    /// Wait after failed attempt `attempt` (1-based); saturates instead of overflowing
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }

    /// Whether another attempt follows `attempt`
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Every wait that can happen, in order (N-1 entries for N attempts)
    pub fn waits(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|k| self.delay(k)).collect()
    }

    /// Total time spent waiting before a service is declared failed
    pub fn total_wait(&self) -> Duration {
        self.waits()
            .into_iter()
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
