//! recordline server binary.
//!
//! Startup: flags -> logging and metrics -> bind -> storage -> pipeline -> serve.
//! Shutdown on SIGINT/SIGTERM: stop accepting requests, wait for in-flight
//! requests, drain the pipeline, flush dead letters, close storage.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use recordline_server::cache::{ReadCache, RecordLookup};
use recordline_server::cli::ServerArgs;
use recordline_server::network::{AppState, NetworkModule};
use recordline_server::pipeline::{dead_letter, DeadLetterJournal, Pipeline};
use recordline_server::storage::MemoryStorage;
use recordline_server::telemetry::{init_tracing, install_metrics};
use recordline_server::StorageBackend;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    let telemetry = args.telemetry_config();
    init_tracing(telemetry.log_format)?;
    install_metrics(&telemetry)?;

    let config = args.server_config();
    config
        .pipeline
        .validate()
        .context("invalid pipeline configuration")?;
    info!(node_id = %config.node_id, "starting recordline server");

    let mut network = NetworkModule::new(config.network.clone());
    let port = network.start().await?;
    let ctrl = network.shutdown_controller();

    let storage = open_storage(&config.storage).await?;
    storage
        .initialize()
        .await
        .context("failed to initialize storage")?;

    let cache = Arc::new(ReadCache::new());
    let (dl_tx, dl_rx) = dead_letter::channel(config.pipeline.dead_letter_capacity);
    let journal = match &config.dead_letter_path {
        Some(path) => DeadLetterJournal::with_file(path.clone()),
        None => DeadLetterJournal::log_only(),
    };
    let journal = tokio::spawn(journal.run(dl_rx));

    let pipeline = Pipeline::start(
        &config.pipeline,
        Arc::clone(&storage),
        Arc::clone(&cache),
        dl_tx,
        ctrl.hard_stop(),
    )?;

    let state = AppState {
        ingress: pipeline.ingress(),
        lookup: RecordLookup::new(Arc::clone(&cache), Arc::clone(&storage)),
        storage: Arc::clone(&storage),
        cache,
        pipeline: pipeline.monitor(),
        shutdown: Arc::clone(&ctrl),
        limits: config.limits,
        search_limit: config.search_limit,
        node_id: Arc::from(config.node_id.as_str()),
        start_time: Instant::now(),
    };
    let mut server = tokio::spawn(network.serve(state));
    info!(port, storage = storage.name(), "recordline server ready");

    let early_exit = tokio::select! {
        signal = shutdown_signal() => {
            match signal {
                Ok(name) => info!(signal = name, "shutdown signal received"),
                Err(e) => error!(error = %e, "signal handling failed, shutting down"),
            }
            None
        }
        result = &mut server => Some(result),
    };

    ctrl.trigger_shutdown();
    let served = match early_exit {
        Some(result) => result,
        None => server.await,
    };
    match served {
        Ok(Ok(())) => info!("HTTP server stopped"),
        Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
    }

    let report = pipeline.shutdown(config.pipeline.drain_timeout).await;
    if report.drained {
        info!("pipeline drained");
    }

    match journal.await {
        Ok(count) if count > 0 => warn!(batches = count, "dead letters recorded this run"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "dead-letter journal task failed"),
    }

    if let Err(e) = storage.close().await {
        warn!(error = %e, "failed to close storage");
    }
    ctrl.set_stopped();
    info!("recordline server stopped");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn open_storage(
    config: &recordline_server::StorageConfig,
) -> anyhow::Result<Arc<dyn StorageBackend>> {
    use recordline_server::storage::PostgresStorage;

    if config.database_url.is_some() {
        let storage = PostgresStorage::connect(config)
            .await
            .context("failed to connect to PostgreSQL")?;
        return Ok(Arc::new(storage));
    }
    warn!("no database URL configured, records are kept in memory only");
    Ok(Arc::new(MemoryStorage::new()))
}

#[cfg(not(feature = "postgres"))]
async fn open_storage(
    config: &recordline_server::StorageConfig,
) -> anyhow::Result<Arc<dyn StorageBackend>> {
    if config.database_url.is_some() {
        warn!("built without the postgres feature, ignoring database URL");
    }
    warn!("records are kept in memory only");
    Ok(Arc::new(MemoryStorage::new()))
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> anyhow::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                Ok("SIGINT")
            }
            _ = term.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        Ok("SIGINT")
    }
}
