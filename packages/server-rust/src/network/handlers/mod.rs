//! HTTP handler definitions for the recordline server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod health;
pub mod records;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use records::{count_records, create_record, get_record, search_records};

use std::sync::Arc;
use std::time::Instant;

use recordline_core::ValidationLimits;

use super::ShutdownController;
use crate::cache::{ReadCache, RecordLookup};
use crate::pipeline::{PipelineMonitor, RecordIngress};
use crate::traits::StorageBackend;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references and cheap handles so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Producer side of the batching pipeline.
    pub ingress: RecordIngress,
    /// Cache-first point lookup with forward-once misses.
    pub lookup: RecordLookup,
    /// Storage for search and count, which bypass the cache.
    pub storage: Arc<dyn StorageBackend>,
    pub cache: Arc<ReadCache>,
    pub pipeline: PipelineMonitor,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    pub limits: ValidationLimits,
    /// Upper bound on search results per request.
    pub search_limit: usize,
    pub node_id: Arc<str>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
