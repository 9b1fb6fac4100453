//! Command-line flags with environment fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{default_node_id, ServerConfig};
use crate::network::{NetworkConfig, TlsConfig};
use crate::pipeline::{PipelineConfig, RetryPolicy};
use crate::storage::{BulkWriter, StorageConfig};
use crate::telemetry::{LogFormat, TelemetryConfig};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "recordline-server",
    version,
    about = "Batching record ingestion server with a forward-once read cache"
)]
pub struct ServerArgs {
    /// Bind address.
    #[arg(long, env = "RECORDLINE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "RECORDLINE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Instance name in logs and `/health`. Random when unset.
    #[arg(long, env = "RECORDLINE_NODE_ID")]
    pub node_id: Option<String>,

    /// `PostgreSQL` URL. Without it records are kept in memory only.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "RECORDLINE_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    #[arg(long, env = "RECORDLINE_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub db_acquire_timeout_secs: u64,

    /// Bulk insert strategy: `batch-insert` or `copy-insert`.
    #[arg(long, env = "RECORDLINE_WRITE_STRATEGY", default_value = "batch-insert")]
    pub write_strategy: BulkWriter,

    #[arg(long, env = "RECORDLINE_BATCHERS", default_value_t = 30)]
    pub batchers: usize,

    #[arg(long, env = "RECORDLINE_WRITERS", default_value_t = 30)]
    pub writers: usize,

    #[arg(long, env = "RECORDLINE_MAX_BATCH_SIZE", default_value_t = 1000)]
    pub max_batch_size: usize,

    #[arg(long, env = "RECORDLINE_FLUSH_INTERVAL_MS", default_value_t = 5000)]
    pub flush_interval_ms: u64,

    #[arg(long, env = "RECORDLINE_INGRESS_CAPACITY", default_value_t = 100_000)]
    pub ingress_capacity: usize,

    #[arg(long, env = "RECORDLINE_BATCH_QUEUE_CAPACITY", default_value_t = 1000)]
    pub batch_queue_capacity: usize,

    /// Emit a batch even when the deadline fires on an empty accumulator.
    #[arg(long, env = "RECORDLINE_EMIT_EMPTY_BATCHES")]
    pub emit_empty_batches: bool,

    #[arg(long, env = "RECORDLINE_WRITE_MAX_RETRIES", default_value_t = 5)]
    pub write_max_retries: u32,

    #[arg(long, env = "RECORDLINE_WRITE_BACKOFF_MS", default_value_t = 100)]
    pub write_backoff_ms: u64,

    #[arg(long, env = "RECORDLINE_WRITE_MAX_BACKOFF_MS", default_value_t = 10_000)]
    pub write_max_backoff_ms: u64,

    /// Keep cache entries of dead-lettered batches.
    #[arg(long, env = "RECORDLINE_KEEP_FAILED_IN_CACHE")]
    pub keep_failed_in_cache: bool,

    /// Append dead-lettered batches to this NDJSON file.
    #[arg(long, env = "RECORDLINE_DEAD_LETTER_PATH")]
    pub dead_letter_path: Option<PathBuf>,

    #[arg(long, env = "RECORDLINE_DEAD_LETTER_CAPACITY", default_value_t = 1024)]
    pub dead_letter_capacity: usize,

    /// Upper bound on flushing queued records at shutdown.
    #[arg(long, env = "RECORDLINE_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,

    #[arg(long, env = "RECORDLINE_SEARCH_LIMIT", default_value_t = 50)]
    pub search_limit: usize,

    #[arg(long, env = "RECORDLINE_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "RECORDLINE_BODY_LIMIT_BYTES", default_value_t = 65_536)]
    pub body_limit_bytes: usize,

    /// Comma-separated allowed origins; `*` allows any.
    #[arg(long, env = "RECORDLINE_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "RECORDLINE_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    #[arg(long, env = "RECORDLINE_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    #[arg(long, env = "RECORDLINE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "RECORDLINE_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl ServerArgs {
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: cert.clone(),
                key_path: key.clone(),
            }),
            _ => None,
        };

        ServerConfig {
            node_id: self.node_id.clone().unwrap_or_else(default_node_id),
            network: NetworkConfig {
                host: self.host.clone(),
                port: self.port,
                tls,
                cors_origins: self.cors_origins.clone(),
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                body_limit_bytes: self.body_limit_bytes,
            },
            pipeline: PipelineConfig {
                batcher_count: self.batchers,
                writer_count: self.writers,
                max_batch_size: self.max_batch_size,
                flush_interval: Duration::from_millis(self.flush_interval_ms),
                ingress_capacity: self.ingress_capacity,
                batch_queue_capacity: self.batch_queue_capacity,
                emit_empty_batches: self.emit_empty_batches,
                retry: RetryPolicy {
                    max_retries: self.write_max_retries,
                    initial_backoff: Duration::from_millis(self.write_backoff_ms),
                    max_backoff: Duration::from_millis(self.write_max_backoff_ms),
                    ..RetryPolicy::default()
                },
                rollback_cache_on_failure: !self.keep_failed_in_cache,
                dead_letter_capacity: self.dead_letter_capacity,
                drain_timeout: Duration::from_secs(self.drain_timeout_secs),
            },
            storage: StorageConfig {
                database_url: self.database_url.clone(),
                max_connections: self.db_max_connections,
                acquire_timeout: Duration::from_secs(self.db_acquire_timeout_secs),
                write_strategy: self.write_strategy,
            },
            search_limit: self.search_limit,
            dead_letter_path: self.dead_letter_path.clone(),
            ..ServerConfig::default()
        }
    }

    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_format: self.log_format,
            metrics_addr: self.metrics_addr,
        }
    }
}
