//! Lock-free pipeline counters and the live snapshot served by `/health`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use recordline_core::{Batch, Record};
use serde::Serialize;

/// Monotonic counters updated by the ingress handle, batchers and writers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    records_ingested: AtomicU64,
    batches_emitted: AtomicU64,
    batches_written: AtomicU64,
    records_written: AtomicU64,
    write_retries: AtomicU64,
    batches_dead_lettered: AtomicU64,
    records_dead_lettered: AtomicU64,
    records_dropped: AtomicU64,
}

impl PipelineStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_ingested(&self) {
        self.records_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_emitted(&self) {
        self.batches_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_written(&self, records: usize) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.records_written.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn write_retried(&self) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_dead_lettered(&self, records: usize) {
        self.batches_dead_lettered.fetch_add(1, Ordering::Relaxed);
        self.records_dead_lettered.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn records_dropped(&self, records: usize) {
        self.records_dropped.fetch_add(records as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn ingested(&self) -> u64 {
        self.records_ingested.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.batches_emitted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dead_lettered(&self) -> u64 {
        self.records_dead_lettered.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    pub accepting: bool,
    pub ingress_depth: usize,
    pub batch_queue_depth: usize,
    pub records_ingested: u64,
    pub batches_emitted: u64,
    pub batches_written: u64,
    pub records_written: u64,
    pub write_retries: u64,
    pub batches_dead_lettered: u64,
    pub records_dead_lettered: u64,
    pub records_dropped: u64,
}

/// Read-only handle combining the counters with live queue depths.
///
/// Holds a receiver on the batch queue and a sender on the ingress queue.
/// Neither keeps a drained pipeline alive: ingress is closed explicitly and
/// writers stop once every batch sender is gone.
#[derive(Debug, Clone)]
pub struct PipelineMonitor {
    stats: Arc<PipelineStats>,
    ingress: async_channel::Sender<Record>,
    batches: async_channel::Receiver<Batch>,
}

impl PipelineMonitor {
    pub(crate) fn new(
        stats: Arc<PipelineStats>,
        ingress: async_channel::Sender<Record>,
        batches: async_channel::Receiver<Batch>,
    ) -> Self {
        Self {
            stats,
            ingress,
            batches,
        }
    }

    #[must_use]
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    #[must_use]
    pub fn snapshot(&self) -> PipelineSnapshot {
        let s = &self.stats;
        PipelineSnapshot {
            accepting: !self.ingress.is_closed(),
            ingress_depth: self.ingress.len(),
            batch_queue_depth: self.batches.len(),
            records_ingested: s.records_ingested.load(Ordering::Relaxed),
            batches_emitted: s.batches_emitted.load(Ordering::Relaxed),
            batches_written: s.batches_written.load(Ordering::Relaxed),
            records_written: s.records_written.load(Ordering::Relaxed),
            write_retries: s.write_retries.load(Ordering::Relaxed),
            batches_dead_lettered: s.batches_dead_lettered.load(Ordering::Relaxed),
            records_dead_lettered: s.records_dead_lettered.load(Ordering::Relaxed),
            records_dropped: s.records_dropped.load(Ordering::Relaxed),
        }
    }
}
