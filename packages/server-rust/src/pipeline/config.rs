use std::time::Duration;

use thiserror::Error;

use super::retry::RetryPolicy;

/// Invalid pipeline settings, reported before any task is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("invalid retry policy: {0}")]
    Retry(String),
}

/// Sizing and timing of the batching pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of batcher tasks reading the ingress queue.
    pub batcher_count: usize,
    /// Number of writer tasks draining the batch queue.
    pub writer_count: usize,
    /// Size trigger: a batch is sealed as soon as it holds this many records.
    pub max_batch_size: usize,
    /// Deadline trigger: period of each batcher's flush timer.
    pub flush_interval: Duration,
    pub ingress_capacity: usize,
    pub batch_queue_capacity: usize,
    /// Emit empty batches when the deadline fires on an empty accumulator.
    pub emit_empty_batches: bool,
    pub retry: RetryPolicy,
    /// Evict a dead-lettered batch's ids from the read cache.
    pub rollback_cache_on_failure: bool,
    pub dead_letter_capacity: usize,
    /// Upper bound on the drain phase at shutdown before tasks are cancelled.
    pub drain_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batcher_count: 30,
            writer_count: 30,
            max_batch_size: 1000,
            flush_interval: Duration::from_secs(5),
            ingress_capacity: 100_000,
            batch_queue_capacity: 1000,
            emit_empty_batches: false,
            retry: RetryPolicy::default(),
            rollback_cache_on_failure: true,
            dead_letter_capacity: 1024,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Checks that every pool size, capacity and period is usable.
    ///
    /// # Errors
    ///
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("batcher_count", self.batcher_count),
            ("writer_count", self.writer_count),
            ("max_batch_size", self.max_batch_size),
            ("ingress_capacity", self.ingress_capacity),
            ("batch_queue_capacity", self.batch_queue_capacity),
            ("dead_letter_capacity", self.dead_letter_capacity),
        ];
        if let Some((field, _)) = counts.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(field));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Zero("flush_interval"));
        }

        let retry = &self.retry;
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Retry(format!(
                "backoff multiplier must be a finite value >= 1.0, got {}",
                retry.backoff_multiplier
            )));
        }
        if retry.initial_backoff > retry.max_backoff {
            return Err(ConfigError::Retry(
                "initial backoff exceeds max backoff".to_string(),
            ));
        }
        Ok(())
    }
}
