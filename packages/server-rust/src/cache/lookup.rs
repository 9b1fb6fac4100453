//! Cache-aside point lookup with the forward-once protocol.
//!
//! 1. Local cache hit: answer from memory.
//! 2. Miss on an unmarked request: answer "not found" and ask the caller to
//!    set the forward marker; storage is not touched.
//! 3. Miss on a marked request: storage decides, and its answer is final.

use std::sync::Arc;

use metrics::counter;
use recordline_core::{MissAction, Record, RecordId, RequestContext};
use tracing::debug;

use super::ReadCache;
use crate::storage::StorageError;
use crate::traits::StorageBackend;

/// Result of one lookup hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Served from the local read cache.
    Cached(Record),
    /// Served from storage on the forwarded hop.
    Stored(Record),
    /// Local miss on the first hop; reply not-found with the marker set.
    Forward,
    /// Confirmed miss; reply not-found without the marker.
    NotFound,
}

impl LookupOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cached(_) => "cached",
            Self::Stored(_) => "stored",
            Self::Forward => "forward",
            Self::NotFound => "not_found",
        }
    }
}

/// Point-lookup service shared by the read handlers.
#[derive(Clone)]
pub struct RecordLookup {
    cache: Arc<ReadCache>,
    storage: Arc<dyn StorageBackend>,
}

impl RecordLookup {
    #[must_use]
    pub fn new(cache: Arc<ReadCache>, storage: Arc<dyn StorageBackend>) -> Self {
        Self { cache, storage }
    }

    /// Looks up a raw path id. A value that is not a UUID cannot exist
    /// anywhere in the fleet, so it is a confirmed miss.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the forwarded hop.
    pub async fn find_raw(
        &self,
        raw_id: &str,
        ctx: RequestContext,
    ) -> Result<LookupOutcome, StorageError> {
        match raw_id.parse::<RecordId>() {
            Ok(id) => self.find(id, ctx).await,
            Err(_) => {
                counter!("recordline_lookups_total", "outcome" => "invalid_id").increment(1);
                Ok(LookupOutcome::NotFound)
            }
        }
    }

    /// Resolves `id` for one hop of the protocol.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the forwarded hop. The caller must not
    /// turn them into a marker-setting reply.
    pub async fn find(
        &self,
        id: RecordId,
        ctx: RequestContext,
    ) -> Result<LookupOutcome, StorageError> {
        let outcome = if let Some(record) = self.cache.get(&id) {
            LookupOutcome::Cached(record)
        } else {
            match ctx.forward.on_cache_miss() {
                MissAction::Forward => LookupOutcome::Forward,
                MissAction::ConsultStorage => match self.storage.find_by_id(id).await? {
                    Some(record) => LookupOutcome::Stored(record),
                    None => LookupOutcome::NotFound,
                },
            }
        };

        debug!(
            %id,
            request_id = ctx.request_id.as_deref().unwrap_or("-"),
            forwarded = ctx.forward.is_forwarded(),
            outcome = outcome.as_str(),
            "record lookup"
        );
        counter!("recordline_lookups_total", "outcome" => outcome.as_str()).increment(1);
        Ok(outcome)
    }
}
