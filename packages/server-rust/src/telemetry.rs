//! Tracing subscriber and Prometheus exporter setup.

use std::net::SocketAddr;

use anyhow::Context;
use clap::ValueEnum;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, one line per event.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub log_format: LogFormat,
    /// Address of the Prometheus scrape endpoint. `None` disables the exporter;
    /// metric calls are then no-ops.
    pub metrics_addr: Option<SocketAddr>,
}

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Starts the Prometheus exporter if an address is configured.
///
/// Must run inside the tokio runtime; the exporter serves from a spawned task.
///
/// # Errors
///
/// Fails if the recorder cannot be installed or the address cannot be bound.
pub fn install_metrics(config: &TelemetryConfig) -> anyhow::Result<()> {
    let Some(addr) = config.metrics_addr else {
        return Ok(());
    };
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to start metrics exporter on {addr}"))?;
    info!(%addr, "prometheus exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_from_cli_values() {
        assert_eq!(LogFormat::from_str("text", true).unwrap(), LogFormat::Text);
        assert_eq!(LogFormat::from_str("JSON", true).unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("xml", true).is_err());
    }

    #[test]
    fn metrics_disabled_without_address() {
        assert!(install_metrics(&TelemetryConfig::default()).is_ok());
    }
}
