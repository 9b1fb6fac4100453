//! Batcher task: turns the record stream into sealed batches.
//!
//! Each batcher owns one [`Accumulator`] and one flush timer. The event loop
//! is polled in a fixed order:
//!
//! 1. cancellation (hard stop, accumulator dropped)
//! 2. the ingress queue (append; size trigger, then overdue deadline)
//! 3. the flush timer (deadline trigger)
//!
//! The timer restarts whenever a batch is sealed, so a record waits at most one
//! flush interval. Checking the deadline after each append keeps a saturated
//! queue from starving the timer branch.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use recordline_core::{Accumulator, Batch, FlushTrigger, Record};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::PipelineStats;

pub(crate) struct Batcher {
    pub(crate) id: usize,
    pub(crate) records: async_channel::Receiver<Record>,
    pub(crate) batches: async_channel::Sender<Batch>,
    pub(crate) max_batch_size: usize,
    pub(crate) flush_interval: Duration,
    pub(crate) emit_empty_batches: bool,
    pub(crate) stats: Arc<PipelineStats>,
    pub(crate) cancel: CancellationToken,
}

impl Batcher {
    pub(crate) async fn run(self) {
        let mut pending = Accumulator::new(self.max_batch_size);
        let deadline = tokio::time::sleep(self.flush_interval);
        tokio::pin!(deadline);

        debug!(batcher = self.id, "batcher started");
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    self.abandon(pending.len(), "cancelled");
                    // Unblock producers; nobody will read this queue again.
                    self.records.close();
                    return;
                }

                received = self.records.recv() => {
                    let Ok(record) = received else {
                        let batch = self.seal(&mut pending, deadline.as_mut(), FlushTrigger::Drain);
                        self.emit(batch).await;
                        debug!(batcher = self.id, "ingress closed, batcher finished");
                        return;
                    };
                    let trigger = if pending.push(record) {
                        Some(FlushTrigger::Size)
                    } else if Instant::now() >= deadline.deadline() {
                        Some(FlushTrigger::Deadline)
                    } else {
                        None
                    };
                    if let Some(trigger) = trigger {
                        let batch = self.seal(&mut pending, deadline.as_mut(), trigger);
                        if !self.emit(batch).await {
                            return;
                        }
                    }
                }

                () = &mut deadline => {
                    let batch = self.seal(&mut pending, deadline.as_mut(), FlushTrigger::Deadline);
                    if !self.emit(batch).await {
                        return;
                    }
                }
            }
        }
    }

    fn seal(
        &self,
        pending: &mut Accumulator,
        deadline: Pin<&mut Sleep>,
        trigger: FlushTrigger,
    ) -> Batch {
        deadline.reset(Instant::now() + self.flush_interval);
        pending.seal(trigger)
    }

    /// Hands a sealed batch to the writers. Returns `false` when the batcher
    /// must stop.
    async fn emit(&self, batch: Batch) -> bool {
        if batch.is_empty() && !(self.emit_empty_batches && batch.trigger() == FlushTrigger::Deadline) {
            return true;
        }

        let size = batch.len();
        let trigger = batch.trigger();
        tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                self.abandon(size, "cancelled while queueing batch");
                self.records.close();
                false
            }

            sent = self.batches.send(batch) => {
                if sent.is_err() {
                    self.abandon(size, "batch queue closed");
                    self.records.close();
                    return false;
                }
                self.stats.batch_emitted();
                counter!("recordline_batches_emitted_total", "trigger" => trigger.as_str()).increment(1);
                #[allow(clippy::cast_precision_loss)]
                histogram!("recordline_batch_size").record(size as f64);
                debug!(batcher = self.id, size, trigger = trigger.as_str(), "batch emitted");
                true
            }
        }
    }

    fn abandon(&self, records: usize, reason: &'static str) {
        if records == 0 {
            return;
        }
        warn!(batcher = self.id, records, reason, "dropping unwritten records");
        self.stats.records_dropped(records);
        counter!("recordline_records_dropped_total").increment(records as u64);
    }
}
