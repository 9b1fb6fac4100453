//! Writer task: one bulk write per sealed batch.
//!
//! Transient failures are retried with jittered exponential backoff. Permanent
//! failures, and transient ones that outlive the retry budget, send the batch
//! to the dead-letter channel and the writer moves on.

use std::sync::Arc;

use metrics::{counter, histogram};
use recordline_core::Batch;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::dead_letter::DeadLetter;
use super::retry::RetryPolicy;
use super::PipelineStats;
use crate::cache::ReadCache;
use crate::storage::StorageError;
use crate::traits::StorageBackend;

pub(crate) struct Writer {
    pub(crate) id: usize,
    pub(crate) batches: async_channel::Receiver<Batch>,
    pub(crate) storage: Arc<dyn StorageBackend>,
    pub(crate) cache: Arc<ReadCache>,
    pub(crate) dead_letters: mpsc::Sender<DeadLetter>,
    pub(crate) retry: RetryPolicy,
    pub(crate) rollback_cache: bool,
    pub(crate) stats: Arc<PipelineStats>,
    pub(crate) cancel: CancellationToken,
}

impl Writer {
    pub(crate) async fn run(self) {
        debug!(writer = self.id, "writer started");
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    self.batches.close();
                    return;
                }

                next = self.batches.recv() => {
                    let Ok(batch) = next else {
                        debug!(writer = self.id, "batch queue drained, writer finished");
                        return;
                    };
                    if !self.write(batch).await {
                        self.batches.close();
                        return;
                    }
                }
            }
        }
    }

    /// Writes one batch to completion or dead letter. Returns `false` if
    /// cancelled while backing off.
    async fn write(&self, batch: Batch) -> bool {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.storage.bulk_write(batch.records()).await {
                Ok(()) => {
                    self.stats.batch_written(batch.len());
                    counter!("recordline_batches_written_total").increment(1);
                    histogram!("recordline_write_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    debug!(writer = self.id, size = batch.len(), attempt, "batch written");
                    return true;
                }
                Err(err) => err,
            };

            if !err.is_transient() || !self.retry.allows_retry_after(attempt) {
                self.dead_letter(batch, attempt, &err);
                return true;
            }

            let delay = self.retry.jittered_backoff(attempt - 1);
            warn!(
                writer = self.id,
                size = batch.len(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "bulk write failed, retrying"
            );
            self.stats.write_retried();
            counter!("recordline_write_retries_total").increment(1);

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    warn!(writer = self.id, records = batch.len(), "cancelled during retry, batch lost");
                    self.stats.records_dropped(batch.len());
                    counter!("recordline_records_dropped_total").increment(batch.len() as u64);
                    return false;
                }

                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn dead_letter(&self, batch: Batch, attempts: u32, err: &StorageError) {
        let size = batch.len();
        self.stats.batch_dead_lettered(size);
        counter!("recordline_batches_dead_lettered_total", "kind" => err.kind()).increment(1);

        if self.rollback_cache {
            let evicted = self.cache.evict_batch(&batch);
            debug!(writer = self.id, evicted, "rolled back cache entries of failed batch");
        }

        let letter = DeadLetter::new(batch, attempts, err.to_string());
        if let Err(send_err) = self.dead_letters.try_send(letter) {
            error!(
                writer = self.id,
                records = size,
                attempts,
                error = %err,
                reason = %send_err,
                "dead-letter channel unavailable, batch discarded"
            );
            counter!("recordline_dead_letters_discarded_total").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use recordline_core::{FlushTrigger, Record};

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::test_support::record;

    struct Harness {
        batches: async_channel::Sender<Batch>,
        storage: Arc<MemoryStorage>,
        cache: Arc<ReadCache>,
        dead_letters: mpsc::Receiver<DeadLetter>,
        stats: Arc<PipelineStats>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_writer(retry: RetryPolicy, rollback_cache: bool) -> Harness {
        let (batch_tx, batch_rx) = async_channel::bounded(16);
        let (dl_tx, dl_rx) = mpsc::channel(16);
        let storage = Arc::new(MemoryStorage::new());
        let cache = Arc::new(ReadCache::new());
        let stats = Arc::new(PipelineStats::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            Writer {
                id: 0,
                batches: batch_rx,
                storage: storage.clone(),
                cache: Arc::clone(&cache),
                dead_letters: dl_tx,
                retry,
                rollback_cache,
                stats: Arc::clone(&stats),
                cancel: cancel.clone(),
            }
            .run(),
        );
        Harness {
            batches: batch_tx,
            storage,
            cache,
            dead_letters: dl_rx,
            stats,
            cancel,
            handle,
        }
    }

    fn cached_batch(cache: &ReadCache, names: &[&str]) -> (Batch, Vec<Record>) {
        let records: Vec<Record> = names.iter().map(|n| record(n)).collect();
        for r in &records {
            cache.insert(r.clone());
        }
        (Batch::new(records.clone(), FlushTrigger::Size), records)
    }

    fn transient() -> StorageError {
        StorageError::Unavailable("connection reset".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn writes_batch_in_one_call() {
        let h = spawn_writer(RetryPolicy::default(), true);
        let (batch, records) = cached_batch(&h.cache, &["a", "b", "c"]);

        h.batches.send(batch).await.unwrap();
        drop(h.batches);
        h.handle.await.unwrap();

        assert_eq!(h.storage.write_calls(), 1);
        assert!(records.iter().all(|r| h.storage.contains(r.id)));
        assert_eq!(h.stats.written(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_within_budget_end_in_one_success() {
        let mut h = spawn_writer(RetryPolicy::default(), true);
        h.storage.inject_write_failures([transient(), transient(), transient()]);
        let (batch, records) = cached_batch(&h.cache, &["a", "b"]);

        h.batches.send(batch).await.unwrap();
        drop(h.batches);
        h.handle.await.unwrap();

        assert_eq!(h.storage.write_calls(), 4);
        assert_eq!(h.storage.len(), 2);
        assert!(records.iter().all(|r| h.cache.contains(&r.id)));
        assert!(h.dead_letters.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_dead_letters_without_retry() {
        let mut h = spawn_writer(RetryPolicy::default(), true);
        h.storage
            .inject_write_failures([StorageError::Rejected("duplicate key".to_string())]);
        let (batch, records) = cached_batch(&h.cache, &["a", "b"]);

        h.batches.send(batch).await.unwrap();
        drop(h.batches);
        h.handle.await.unwrap();

        assert_eq!(h.storage.write_calls(), 1);
        let letter = h.dead_letters.try_recv().unwrap();
        assert_eq!(letter.attempts, 1);
        assert_eq!(letter.records, records);
        assert!(h.dead_letters.try_recv().is_err());
        assert!(records.iter().all(|r| !h.cache.contains(&r.id)));
        assert!(h.cache.is_empty());
        assert_eq!(h.stats.dead_lettered(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_dead_letter_with_attempt_count() {
        let retry = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        let mut h = spawn_writer(retry, true);
        h.storage
            .inject_write_failures([transient(), transient(), transient()]);
        let (batch, _) = cached_batch(&h.cache, &["a"]);

        h.batches.send(batch).await.unwrap();
        drop(h.batches);
        h.handle.await.unwrap();

        assert_eq!(h.storage.write_calls(), 3);
        assert_eq!(h.dead_letters.try_recv().unwrap().attempts, 3);
        assert!(h.storage.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_can_be_disabled() {
        let mut h = spawn_writer(RetryPolicy::none(), false);
        h.storage.inject_write_failures([transient()]);
        let (batch, records) = cached_batch(&h.cache, &["a"]);

        h.batches.send(batch).await.unwrap();
        drop(h.batches);
        h.handle.await.unwrap();

        assert!(h.dead_letters.try_recv().is_ok());
        assert!(h.cache.contains(&records[0].id));
    }

    #[tokio::test(start_paused = true)]
    async fn writer_continues_after_dead_letter() {
        let mut h = spawn_writer(RetryPolicy::none(), true);
        h.storage
            .inject_write_failures([StorageError::Rejected("bad row".to_string())]);
        let (failing, _) = cached_batch(&h.cache, &["a"]);
        let (ok, ok_records) = cached_batch(&h.cache, &["b"]);

        h.batches.send(failing).await.unwrap();
        h.batches.send(ok).await.unwrap();
        drop(h.batches);
        h.handle.await.unwrap();

        assert_eq!(h.dead_letters.try_recv().unwrap().records.len(), 1);
        assert!(h.storage.contains(ok_records[0].id));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let retry = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 1.0,
        };
        let h = spawn_writer(retry, true);
        h.storage.inject_write_failures([transient()]);
        let (batch, _) = cached_batch(&h.cache, &["a", "b"]);
        h.batches.send(batch).await.unwrap();

        while h.storage.write_calls() == 0 {
            tokio::task::yield_now().await;
        }
        h.cancel.cancel();
        h.handle.await.unwrap();

        assert_eq!(h.stats.dropped(), 2);
        assert!(h.storage.is_empty());
        assert!(h.batches.is_closed());
    }
}
