//! Storage backends for the writer pool and the read path.
//!
//! - [`MemoryStorage`]: process-local, used when no database is configured
//!   and throughout the tests.
//! - [`PostgresStorage`] (feature `postgres`): `sqlx` pool shared by all
//!   writers and readers; bulk writes use the configured [`BulkWriter`].

mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use error::StorageError;
pub use memory::MemoryStorage;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;

/// Strategy used to turn one batch into one atomic bulk insert.
///
/// Chosen once at construction time; every writer shares the same strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BulkWriter {
    /// Multi-row `INSERT ... VALUES` statements inside one transaction.
    #[default]
    BatchInsert,
    /// One `COPY ... FROM STDIN` stream in CSV format.
    CopyInsert,
}

impl BulkWriter {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatchInsert => "batch-insert",
            Self::CopyInsert => "copy-insert",
        }
    }
}

impl fmt::Display for BulkWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkWriter {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch-insert" | "batch" => Ok(Self::BatchInsert),
            "copy-insert" | "copy" => Ok(Self::CopyInsert),
            other => Err(StorageError::Config(format!(
                "unknown write strategy {other:?} (expected batch-insert or copy-insert)"
            ))),
        }
    }
}

/// Relational storage settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// `PostgreSQL` connection URL. `None` selects [`MemoryStorage`].
    pub database_url: Option<String>,
    /// Upper bound on pooled connections shared by writers and readers.
    pub max_connections: u32,
    /// How long a caller waits for a pooled connection before failing.
    pub acquire_timeout: Duration,
    pub write_strategy: BulkWriter,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            write_strategy: BulkWriter::BatchInsert,
        }
    }
}
