//! Batches that could not be written, and the journal that keeps them.
//!
//! Writers hand dead letters over a bounded channel without waiting. The
//! journal task logs each one and, when a path is configured, appends it as
//! one JSON line so the records can be replayed later.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use recordline_core::{Batch, FlushTrigger, Record};
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info};

/// A batch the writer pool gave up on.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub failed_at: DateTime<Utc>,
    /// Bulk-write attempts made, the first one included.
    pub attempts: u32,
    pub error: String,
    pub trigger: FlushTrigger,
    pub records: Vec<Record>,
}

impl DeadLetter {
    #[must_use]
    pub fn new(batch: Batch, attempts: u32, error: String) -> Self {
        let trigger = batch.trigger();
        Self {
            failed_at: Utc::now(),
            attempts,
            error,
            trigger,
            records: batch.into_records(),
        }
    }
}

/// Creates the bounded dead-letter channel.
#[must_use]
pub fn channel(capacity: usize) -> (mpsc::Sender<DeadLetter>, mpsc::Receiver<DeadLetter>) {
    mpsc::channel(capacity)
}

/// Consumer of the dead-letter channel.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterJournal {
    path: Option<PathBuf>,
}

impl DeadLetterJournal {
    /// Journal that only logs.
    #[must_use]
    pub fn log_only() -> Self {
        Self { path: None }
    }

    /// Journal that also appends NDJSON to `path`.
    #[must_use]
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Runs until every sender is dropped. Returns the number of dead letters
    /// received.
    pub async fn run(self, mut rx: mpsc::Receiver<DeadLetter>) -> u64 {
        let mut received = 0u64;
        while let Some(letter) = rx.recv().await {
            received += 1;
            error!(
                records = letter.records.len(),
                attempts = letter.attempts,
                trigger = letter.trigger.as_str(),
                error = %letter.error,
                "batch dead-lettered"
            );
            if let Some(path) = &self.path {
                if let Err(err) = append(path, &letter).await {
                    error!(path = %path.display(), error = %err, "failed to journal dead letter");
                }
            }
        }
        info!(received, "dead-letter journal closed");
        received
    }
}

async fn append(path: &Path, letter: &DeadLetter) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(letter)?;
    line.push(b'\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(&line).await?;
    file.flush().await
}
