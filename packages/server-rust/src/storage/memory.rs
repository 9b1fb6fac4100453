//! In-memory [`StorageBackend`] implementation.
//!
//! Keeps every record in a `HashMap` behind a `parking_lot::RwLock` so a bulk
//! write becomes visible all at once, like a committed transaction. Duplicate
//! ids reject the whole batch, matching the primary-key behavior of the
//! relational backend.
//!
//! Also supports scripted write failures so the retry and dead-letter paths
//! can be exercised without a database.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use recordline_core::{Record, RecordId};

use super::StorageError;
use crate::traits::StorageBackend;

/// Process-local storage for development, tests, and benchmarks.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<RecordId, Record>>,
    scripted_failures: Mutex<VecDeque<StorageError>>,
    write_calls: AtomicU64,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues errors returned by the next `bulk_write` calls, one per call,
    /// before any record is inserted.
    pub fn inject_write_failures(&self, errors: impl IntoIterator<Item = StorageError>) {
        self.scripted_failures.lock().extend(errors);
    }

    /// Number of `bulk_write` calls received, failed ones included.
    #[must_use]
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::Relaxed)
    }

    /// Number of stored records (synchronous, for assertions).
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: RecordId) -> bool {
        self.records.read().contains_key(&id)
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn bulk_write(&self, records: &[Record]) -> Result<(), StorageError> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);

        if let Some(err) = self.scripted_failures.lock().pop_front() {
            return Err(err);
        }
        if records.is_empty() {
            return Ok(());
        }

        let mut stored = self.records.write();

        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            if stored.contains_key(&record.id) || !seen.insert(record.id) {
                return Err(StorageError::Rejected(format!(
                    "duplicate record id {}",
                    record.id
                )));
            }
        }

        stored.extend(records.iter().map(|r| (r.id, r.clone())));
        Ok(())
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<Record>, StorageError> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn search_by_text(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Record>, StorageError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.matches_term(term))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.records.read().len() as u64)
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
