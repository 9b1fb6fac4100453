use async_trait::async_trait;
use recordline_core::{Record, RecordId};

use crate::storage::StorageError;

/// Pluggable durable store behind the writer pool and the read handlers.
/// Implementations: `PostgreSQL` (feature `postgres`), memory (dev and tests).
///
/// Used as `Arc<dyn StorageBackend>`; one instance is shared by every writer
/// and request handler, so implementations bound their own concurrency (for
/// `PostgreSQL`, through the connection pool).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert every record of one batch in a single atomic operation.
    ///
    /// Either all records become visible or none do. An empty slice is a
    /// successful no-op.
    async fn bulk_write(&self, records: &[Record]) -> Result<(), StorageError>;

    /// Load a single record by id.
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Record>, StorageError>;

    /// Records whose search text contains `term` literally, at most `limit`.
    async fn search_by_text(&self, term: &str, limit: usize)
        -> Result<Vec<Record>, StorageError>;

    /// Total number of stored records.
    async fn count(&self) -> Result<u64, StorageError>;

    /// One-time idempotent initialization (create tables and indexes).
    async fn initialize(&self) -> Result<(), StorageError>;

    /// Release resources and close connections.
    async fn close(&self) -> Result<(), StorageError>;

    /// Short backend name for logs and the health endpoint.
    fn name(&self) -> &'static str;
}
