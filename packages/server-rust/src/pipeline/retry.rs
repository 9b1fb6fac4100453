//! Bounded exponential backoff for transient bulk-write failures.
//!
//! ```text
//! attempt 1: immediate
//! attempt 2: wait ~initial_backoff
//! attempt 3: wait ~initial_backoff * multiplier
//! ...
//! attempt max_retries + 1: last try, then dead letter
//! ```
//!
//! Each wait is drawn uniformly from `[base / 2, base]` so writers that failed
//! together do not retry in lockstep.

use std::time::Duration;

use rand::Rng;

/// Retry policy applied by every writer.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (0-based), without jitter.
    ///
    /// `min(initial_backoff * multiplier^retry, max_backoff)`
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let scaled = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }

    /// [`backoff`](Self::backoff) with jitter applied.
    #[must_use]
    pub fn jittered_backoff(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        let nanos = u64::try_from(base.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(rand::rng().random_range(nanos / 2..=nanos))
    }

    /// Whether a failed attempt number `attempt` (1-based) may be retried.
    #[must_use]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}
