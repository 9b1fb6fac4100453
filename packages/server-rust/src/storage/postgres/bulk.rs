//! The two [`BulkWriter`] strategies against `PostgreSQL`.

use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{copy_rows, COLUMNS};
use crate::storage::{BulkWriter, StorageError};
use recordline_core::Record;

/// Bind-parameter ceiling of the extended protocol divided by columns per row.
const MAX_ROWS_PER_STATEMENT: usize = u16::MAX as usize / COLUMNS.len();

impl BulkWriter {
    /// Writes `records` atomically using this strategy.
    pub(super) async fn write(self, pool: &PgPool, records: &[Record]) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        match self {
            Self::BatchInsert => batch_insert(pool, records).await,
            Self::CopyInsert => copy_insert(pool, records).await,
        }
    }
}

/// Multi-row `INSERT`s in one transaction. Batches larger than the bind limit
/// are split into several statements that commit together.
async fn batch_insert(pool: &PgPool, records: &[Record]) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;

    for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("INSERT INTO records ({}) ", COLUMNS.join(", ")));
        builder.push_values(chunk, |mut row, record| {
            row.push_bind(*record.id.as_uuid())
                .push_bind(record.name.clone())
                .push_bind(record.nickname.clone())
                .push_bind(record.birth_date)
                .push_bind(record.tags.clone())
                .push_bind(record.search_text());
        });
        builder.build().execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// One `COPY FROM STDIN` statement; the server applies it all-or-nothing.
async fn copy_insert(pool: &PgPool, records: &[Record]) -> Result<(), StorageError> {
    let statement = format!(
        "COPY records ({}) FROM STDIN WITH (FORMAT csv)",
        COLUMNS.join(", ")
    );
    let payload = copy_rows::encode_rows(records)?;

    let mut conn = pool.acquire().await?;
    let mut copy = conn.copy_in_raw(&statement).await?;
    let sent = copy.send(payload).await.map(|_| ());
    if let Err(err) = sent {
        // Best effort: the connection may already be gone.
        let _ = copy.abort(err.to_string()).await;
        return Err(err.into());
    }
    copy.finish().await?;
    Ok(())
}
