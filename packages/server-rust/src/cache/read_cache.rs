//! Read-your-write cache backed by [`DashMap`].
//!
//! Filled by the ingestion handler before a record is durable, so the accepting
//! instance can serve it immediately. Entries live for the process lifetime;
//! the only removal path is the rollback of records whose batch was
//! dead-lettered, and the rollback of a record the pipeline refused.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::gauge;
use recordline_core::{Batch, Record, RecordId};

/// Process-wide concurrent id -> record map.
///
/// Safe for any number of concurrent readers and writers without external
/// locking. Shared as `Arc<ReadCache>`.
#[derive(Debug, Default)]
pub struct ReadCache {
    entries: DashMap<RecordId, Record>,
}

impl ReadCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record` unless its id is already cached.
    ///
    /// Returns `false` (and keeps the existing entry) for a repeated id.
    pub fn insert(&self, record: Record) -> bool {
        match self.entries.entry(record.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                gauge!("recordline_cache_entries").increment(1.0);
                true
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.entries.get(id).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.entries.contains_key(id)
    }

    /// Removes one entry, returning it if it was present.
    pub fn evict(&self, id: &RecordId) -> Option<Record> {
        let removed = self.entries.remove(id).map(|(_, r)| r);
        if removed.is_some() {
            gauge!("recordline_cache_entries").decrement(1.0);
        }
        removed
    }

    /// Removes every record of a batch that storage refused.
    ///
    /// Returns the number of entries actually removed.
    pub fn evict_batch(&self, batch: &Batch) -> usize {
        batch.ids().filter(|id| self.evict(id).is_some()).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
