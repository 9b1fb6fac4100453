//! Ingestion batching pipeline.
//!
//! ```text
//! RecordIngress -> [ingress queue] -> Batcher x N -> [batch queue] -> Writer x M -> storage
//!                                                                       |
//!                                                                       +-> dead letters
//! ```
//!
//! Both queues are bounded MPMC channels; pool members share nothing else but
//! the statistics counters. Shutdown is two-phase: closing the ingress queue
//! lets every stage drain in order, and the hard-stop token cancels whatever
//! is still running once the drain timeout expires.

mod batcher;
pub mod config;
pub mod dead_letter;
pub mod ingress;
pub mod retry;
pub mod stats;
mod writer;

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use recordline_core::{Batch, Record};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use config::{ConfigError, PipelineConfig};
pub use dead_letter::{DeadLetter, DeadLetterJournal};
pub use ingress::{IngestError, RecordIngress};
pub use retry::RetryPolicy;
pub use stats::{PipelineMonitor, PipelineSnapshot, PipelineStats};

use crate::cache::ReadCache;
use crate::traits::StorageBackend;
use batcher::Batcher;
use writer::Writer;

/// Outcome of [`Pipeline::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Every stage finished before the timeout.
    pub drained: bool,
    /// Records still queued when the pipeline was cancelled. Records held in
    /// accumulators or in a retrying writer are counted by `records_dropped`.
    pub stranded_records: usize,
}

/// Running batcher and writer pools.
pub struct Pipeline {
    ingress_tx: async_channel::Sender<Record>,
    ingress_rx: async_channel::Receiver<Record>,
    batch_rx: async_channel::Receiver<Batch>,
    batchers: JoinSet<()>,
    writers: JoinSet<()>,
    cache: Arc<ReadCache>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Validates `config` and spawns both pools on the current runtime.
    ///
    /// `cancel` is the hard-stop signal; cancelling it drops everything that
    /// is not yet written.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn start(
        config: &PipelineConfig,
        storage: Arc<dyn StorageBackend>,
        cache: Arc<ReadCache>,
        dead_letters: mpsc::Sender<DeadLetter>,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (ingress_tx, ingress_rx) = async_channel::bounded(config.ingress_capacity);
        let (batch_tx, batch_rx) = async_channel::bounded(config.batch_queue_capacity);
        let stats = Arc::new(PipelineStats::new());

        let mut batchers = JoinSet::new();
        for id in 0..config.batcher_count {
            batchers.spawn(
                Batcher {
                    id,
                    records: ingress_rx.clone(),
                    batches: batch_tx.clone(),
                    max_batch_size: config.max_batch_size,
                    flush_interval: config.flush_interval,
                    emit_empty_batches: config.emit_empty_batches,
                    stats: Arc::clone(&stats),
                    cancel: cancel.clone(),
                }
                .run(),
            );
        }
        // Writers see the batch queue close once the last batcher exits.
        drop(batch_tx);

        let mut writers = JoinSet::new();
        for id in 0..config.writer_count {
            writers.spawn(
                Writer {
                    id,
                    batches: batch_rx.clone(),
                    storage: Arc::clone(&storage),
                    cache: Arc::clone(&cache),
                    dead_letters: dead_letters.clone(),
                    retry: config.retry.clone(),
                    rollback_cache: config.rollback_cache_on_failure,
                    stats: Arc::clone(&stats),
                    cancel: cancel.clone(),
                }
                .run(),
            );
        }

        info!(
            batchers = config.batcher_count,
            writers = config.writer_count,
            max_batch_size = config.max_batch_size,
            flush_interval_ms = u64::try_from(config.flush_interval.as_millis()).unwrap_or(u64::MAX),
            storage = storage.name(),
            "pipeline started"
        );

        Ok(Self {
            ingress_tx,
            ingress_rx,
            batch_rx,
            batchers,
            writers,
            cache,
            stats,
            cancel,
        })
    }

    /// Producer handle for the ingestion handler.
    #[must_use]
    pub fn ingress(&self) -> RecordIngress {
        RecordIngress::new(
            self.ingress_tx.clone(),
            Arc::clone(&self.cache),
            Arc::clone(&self.stats),
        )
    }

    #[must_use]
    pub fn monitor(&self) -> PipelineMonitor {
        PipelineMonitor::new(
            Arc::clone(&self.stats),
            self.ingress_tx.clone(),
            self.batch_rx.clone(),
        )
    }

    #[must_use]
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Stops accepting records and drains both pools.
    ///
    /// Batchers flush their remainders with the `Drain` trigger and writers
    /// finish the batch queue. If that takes longer than `drain_timeout` the
    /// hard-stop token is cancelled and the loss is logged.
    pub async fn shutdown(mut self, drain_timeout: Duration) -> DrainReport {
        self.ingress_tx.close();
        info!(
            queued = self.ingress_tx.len(),
            timeout_ms = u64::try_from(drain_timeout.as_millis()).unwrap_or(u64::MAX),
            "draining pipeline"
        );

        let drained = tokio::time::timeout(drain_timeout, async {
            join_all(&mut self.batchers, "batcher").await;
            join_all(&mut self.writers, "writer").await;
        })
        .await
        .is_ok();

        if drained {
            info!(written = self.stats.written(), "pipeline drained");
            return DrainReport {
                drained: true,
                stranded_records: 0,
            };
        }

        self.cancel.cancel();
        join_all(&mut self.batchers, "batcher").await;
        join_all(&mut self.writers, "writer").await;

        let mut stranded = 0usize;
        while self.ingress_rx.try_recv().is_ok() {
            stranded += 1;
        }
        while let Ok(batch) = self.batch_rx.try_recv() {
            stranded += batch.len();
        }
        self.stats.records_dropped(stranded);
        counter!("recordline_records_dropped_total").increment(stranded as u64);
        error!(
            stranded,
            dropped_total = self.stats.dropped(),
            "drain timeout expired, unwritten records lost"
        );

        DrainReport {
            drained: false,
            stranded_records: stranded,
        }
    }
}

async fn join_all(set: &mut JoinSet<()>, role: &'static str) {
    while let Some(joined) = set.join_next().await {
        if let Err(err) = joined {
            if err.is_panic() {
                error!(role, error = %err, "pipeline task panicked");
            } else {
                warn!(role, error = %err, "pipeline task aborted");
            }
        }
    }
}
