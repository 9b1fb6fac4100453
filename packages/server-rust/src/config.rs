use std::path::PathBuf;

use recordline_core::ValidationLimits;

use crate::network::NetworkConfig;
use crate::pipeline::PipelineConfig;
use crate::storage::StorageConfig;

/// Complete server configuration, assembled by [`ServerArgs`](crate::cli::ServerArgs).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Identifier of this instance in logs and `/health`.
    pub node_id: String,
    pub network: NetworkConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    /// Maximum number of records returned by one search.
    pub search_limit: usize,
    pub limits: ValidationLimits,
    /// NDJSON file receiving dead-lettered batches. `None` only logs them.
    pub dead_letter_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            network: NetworkConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            search_limit: 50,
            limits: ValidationLimits::default(),
            dead_letter_path: None,
        }
    }
}

/// `node-` followed by the first eight hex digits of a random UUID.
#[must_use]
pub fn default_node_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("node-{}", &id[..8])
}
