//! Producer side of the pipeline used by the ingestion handler.

use std::sync::Arc;

use metrics::counter;
use recordline_core::{Record, RecordId};
use thiserror::Error;
use tracing::warn;

use super::PipelineStats;
use crate::cache::ReadCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The ingress queue is closed (draining or stopped).
    #[error("pipeline is not accepting records")]
    Closed,
}

/// Cloneable handle that makes a record readable locally and queues it for
/// durable storage.
#[derive(Debug, Clone)]
pub struct RecordIngress {
    tx: async_channel::Sender<Record>,
    cache: Arc<ReadCache>,
    stats: Arc<PipelineStats>,
}

impl RecordIngress {
    pub(crate) fn new(
        tx: async_channel::Sender<Record>,
        cache: Arc<ReadCache>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self { tx, cache, stats }
    }

    /// Caches `record`, then enqueues it. Waits while the ingress queue is
    /// full.
    ///
    /// Cancel safe: if the returned future is dropped before the record is
    /// queued, the cache entry is removed again.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Closed`] if the pipeline stopped accepting
    /// records; the cache entry is removed again in that case.
    pub async fn submit(&self, record: Record) -> Result<RecordId, IngestError> {
        let id = record.id;
        let pending = PendingEntry {
            cache: &self.cache,
            id,
            armed: self.cache.insert(record.clone()),
        };

        if self.tx.send(record).await.is_err() {
            drop(pending);
            warn!(%id, "record refused, pipeline closed");
            return Err(IngestError::Closed);
        }
        pending.disarm();

        self.stats.record_ingested();
        counter!("recordline_records_ingested_total").increment(1);
        Ok(id)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Evicts a freshly cached record on drop unless it was queued.
struct PendingEntry<'a> {
    cache: &'a ReadCache,
    id: RecordId,
    armed: bool,
}

impl PendingEntry<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.evict(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::record;

    fn ingress(capacity: usize) -> (RecordIngress, async_channel::Receiver<Record>, Arc<ReadCache>) {
        let (tx, rx) = async_channel::bounded(capacity);
        let cache = Arc::new(ReadCache::new());
        let handle = RecordIngress::new(tx, Arc::clone(&cache), Arc::new(PipelineStats::new()));
        (handle, rx, cache)
    }

    #[tokio::test]
    async fn submit_caches_before_queueing() {
        let (handle, rx, cache) = ingress(4);
        let rec = record("ada");

        let id = handle.submit(rec.clone()).await.unwrap();

        assert_eq!(id, rec.id);
        assert_eq!(cache.get(&id), Some(rec.clone()));
        assert_eq!(rx.recv().await.unwrap(), rec);
        assert_eq!(handle.stats.ingested(), 1);
    }

    #[tokio::test]
    async fn submit_on_closed_pipeline_rolls_back_cache() {
        let (handle, rx, cache) = ingress(4);
        rx.close();
        let rec = record("ada");

        assert_eq!(handle.submit(rec.clone()).await, Err(IngestError::Closed));
        assert!(!cache.contains(&rec.id));
        assert!(handle.is_closed());
        assert_eq!(handle.stats.ingested(), 0);
    }

    #[tokio::test]
    async fn submit_waits_for_room_in_full_queue() {
        let (handle, rx, _cache) = ingress(1);
        handle.submit(record("first")).await.unwrap();

        let pending = tokio::spawn({
            let handle = handle.clone();
            async move { handle.submit(record("second")).await }
        });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        assert_eq!(rx.recv().await.unwrap().name, "first");
        assert!(pending.await.unwrap().is_ok());
        assert_eq!(rx.recv().await.unwrap().name, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_submit_leaves_no_cache_entry() {
        let (handle, rx, cache) = ingress(1);
        handle.submit(record("first")).await.unwrap();
        let blocked = record("blocked");

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), handle.submit(blocked.clone())).await;

        assert!(timed_out.is_err());
        assert!(!cache.contains(&blocked.id));
        assert_eq!(rx.recv().await.unwrap().name, "first");
        assert!(rx.is_empty());
        assert_eq!(handle.stats.ingested(), 1);
    }

    #[tokio::test]
    async fn duplicate_id_keeps_existing_entry_on_failure() {
        let (handle, rx, cache) = ingress(4);
        let rec = record("ada");
        handle.submit(rec.clone()).await.unwrap();
        rx.close();

        assert_eq!(handle.submit(rec.clone()).await, Err(IngestError::Closed));
        assert!(cache.contains(&rec.id));
    }
}
