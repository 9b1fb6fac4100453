//! `PostgreSQL` [`StorageBackend`] on a shared `sqlx` pool.

mod bulk;
mod copy_rows;

use std::str::FromStr;

use async_trait::async_trait;
use recordline_core::{Record, RecordId};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info, warn};
use uuid::Uuid;

use super::{BulkWriter, StorageConfig, StorageError};
use crate::traits::StorageBackend;

/// Column order shared by both bulk strategies.
const COLUMNS: [&str; 6] = ["id", "name", "nickname", "birth_date", "tags", "search"];

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS records (
    id UUID PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    nickname VARCHAR(32) NOT NULL,
    birth_date DATE NOT NULL,
    tags TEXT[] NOT NULL DEFAULT '{}',
    search TEXT NOT NULL
)";

const CREATE_TRGM: &str = "CREATE EXTENSION IF NOT EXISTS pg_trgm";

const CREATE_SEARCH_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS records_search_trgm ON records USING gin (search gin_trgm_ops)";

const SELECT_COLUMNS: &str = "id, name, nickname, birth_date, tags";

/// Durable storage in a `records` table.
pub struct PostgresStorage {
    pool: PgPool,
    writer: BulkWriter,
}

impl PostgresStorage {
    /// Opens a bounded pool against `config.database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] if no URL is set or it cannot be parsed,
    /// and [`StorageError::Unavailable`] if the first connection fails.
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StorageError::Config("database url is not set".to_string()))?;
        let options = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        info!(
            max_connections = config.max_connections,
            write_strategy = %config.write_strategy,
            "connected to PostgreSQL"
        );
        Ok(Self::with_pool(pool, config.write_strategy))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn with_pool(pool: PgPool, writer: BulkWriter) -> Self {
        Self { pool, writer }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn writer(&self) -> BulkWriter {
        self.writer
    }
}

#[async_trait]
impl StorageBackend for PostgresStorage {
    async fn bulk_write(&self, records: &[Record]) -> Result<(), StorageError> {
        self.writer.write(&self.pool, records).await
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<Record>, StorageError> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM records WHERE id = $1"))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn search_by_text(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Record>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM records WHERE search LIKE $1 LIMIT $2"
        ))
        .bind(like_pattern(term))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        u64::try_from(count).map_err(|e| StorageError::Decode(e.to_string()))
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;

        // The trigram index is an optimization; roles without CREATE on the
        // database still get a working (sequential) search.
        match sqlx::query(CREATE_TRGM).execute(&self.pool).await {
            Ok(_) => {
                sqlx::query(CREATE_SEARCH_INDEX).execute(&self.pool).await?;
            }
            Err(err) => {
                warn!(error = %err, "pg_trgm unavailable, search runs without an index");
            }
        }

        info!("records table ready");
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

fn record_from_row(row: &PgRow) -> Result<Record, StorageError> {
    Ok(Record {
        id: RecordId::from(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        nickname: row.try_get("nickname")?,
        birth_date: row.try_get("birth_date")?,
        tags: row.try_get("tags")?,
    })
}

/// `LIKE` pattern matching `term` literally anywhere in the column.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(like_pattern(r"a\b"), r"%a\\b%");
    }

    #[test]
    fn columns_match_table_definition() {
        for column in COLUMNS {
            assert!(CREATE_TABLE.contains(column), "{column} missing from DDL");
        }
    }

    #[tokio::test]
    async fn connect_without_url_is_config_error() {
        let Err(err) = PostgresStorage::connect(&StorageConfig::default()).await else {
            panic!("connect must fail without a url");
        };
        assert_eq!(err.kind(), "config");
    }

    #[tokio::test]
    async fn connect_with_malformed_url_is_config_error() {
        let config = StorageConfig {
            database_url: Some("not a url".to_string()),
            ..StorageConfig::default()
        };
        let Err(err) = PostgresStorage::connect(&config).await else {
            panic!("connect must fail for a malformed url");
        };
        assert!(!err.is_transient());
    }
}
