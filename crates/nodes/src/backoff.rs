//! Backoff schedule for retried provider calls.
//!
//! `delay = min(max_delay, base * 2^n) + uniform(0, delay / 2)` where `n` is
//! the zero-based retry index and `base` depends on the error kind. Distinct
//! bases per kind keep concurrent workers that fail for different reasons from
//! retrying in lock-step.

use std::time::Duration;

use pipeline::ErrorKind;
use rand::Rng;

/// Tunables for [`crate::CompletionClient`] retries.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Base delay for rate limits and any other retryable kind.
    pub default_base: Duration,
    /// Base delay after a timeout.
    pub timeout_base: Duration,
    /// Base delay after a connection failure.
    pub connection_base: Duration,
    /// Ceiling on the exponential part of the delay.
    pub max_delay: Duration,
    /// Factor applied to the per-attempt timeout after a timeout.
    pub timeout_shrink: f64,
    /// The per-attempt timeout never shrinks below this.
    pub timeout_floor: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            default_base: Duration::from_secs(1),
            timeout_base: Duration::from_secs(2),
            connection_base: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            timeout_shrink: 0.8,
            timeout_floor: Duration::from_secs(10),
        }
    }
}

impl BackoffConfig {
    /// Base delay for `kind`.
    pub fn base_delay(&self, kind: ErrorKind) -> Duration {
        match kind {
            ErrorKind::Timeout => self.timeout_base,
            ErrorKind::ConnectionFailed => self.connection_base,
            _ => self.default_base,
        }
    }

    /// Exponential part of the delay before retry `retry_index` (zero-based),
    /// capped at `max_delay`.
    pub fn capped_delay(&self, kind: ErrorKind, retry_index: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_index).unwrap_or(u32::MAX);
        self.base_delay(kind)
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Full delay including jitter drawn from `rng`.
    pub fn delay<R: Rng>(&self, kind: ErrorKind, retry_index: u32, rng: &mut R) -> Duration {
        let capped = self.capped_delay(kind, retry_index);
        let jitter = rng.gen_range(0.0..=capped.as_secs_f64() / 2.0);
        capped + Duration::from_secs_f64(jitter)
    }

    /// Per-attempt timeout to use after a timed-out attempt.
    ///
    /// Shrinks by `timeout_shrink` down to `timeout_floor`, and never grows a
    /// timeout that was configured below the floor.
    pub fn next_timeout(&self, current: Duration) -> Duration {
        current
            .mul_f64(self.timeout_shrink)
            .max(self.timeout_floor)
            .min(current)
    }
}
