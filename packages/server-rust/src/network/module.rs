//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates the shutdown controller, `start()` binds the TCP
//! listener, and `serve()` starts accepting connections. Storage and the
//! pipeline are wired between `start()` and `serve()`, so a port conflict
//! fails fast before any database connection is opened.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{
    count_records, create_record, get_record, health_handler, liveness_handler,
    readiness_handler, search_records, AppState,
};
use super::middleware::{build_http_layers, track_in_flight};
use super::shutdown::ShutdownController;

/// How long `serve()` waits for in-flight requests after the listener stops.
const REQUEST_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Assembles the axum router with all routes and middleware.
///
/// Routes:
/// - `POST /records`, `GET /records?t=` -- ingest, search
/// - `GET /records/count` -- durable record count
/// - `GET /records/{id}` -- point lookup with forward-once misses
/// - `GET /health`, `/health/live`, `/health/ready` -- probes
///
/// Bodies larger than `config.body_limit_bytes` are rejected with 413.
pub fn build_router(state: AppState, config: &NetworkConfig) -> Router {
    let records = Router::new()
        .route("/records", get(search_records).post(create_record))
        .route("/records/count", get(count_records))
        .route("/records/{id}", get(get_record))
        .route_layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.shutdown),
            track_in_flight,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .merge(records)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Manages the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    ///
    /// The pipeline takes its hard-stop token from here; the binary uses it
    /// to trigger shutdown.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until the shutdown controller's HTTP token fires,
    /// then waits for in-flight requests to finish.
    ///
    /// Health stays `Draining` on return; the caller drains the pipeline and
    /// marks the controller stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, if TLS material
    /// cannot be loaded, or if the server hits a fatal I/O error.
    pub async fn serve(self, mut state: AppState) -> anyhow::Result<()> {
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let shutdown_ctrl = self.shutdown;
        let config = self.config;

        // In-flight tracking must count against the controller we drain on.
        state.shutdown = Arc::clone(&shutdown_ctrl);

        let router = build_router(state, &config);

        // Transition to Ready so readiness probes pass.
        shutdown_ctrl.set_ready();

        if let Some(ref tls_config) = config.tls {
            serve_tls(listener, router, tls_config, &shutdown_ctrl).await?;
        } else {
            serve_plain(listener, router, &shutdown_ctrl).await?;
        }

        if shutdown_ctrl.wait_for_drain(REQUEST_DRAIN_TIMEOUT).await {
            info!("all in-flight requests completed");
        } else {
            warn!(
                in_flight = shutdown_ctrl.in_flight_count(),
                "request drain timeout expired"
            );
        }
        Ok(())
    }
}

/// Serves plain HTTP using axum's built-in server.
async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown_ctrl: &ShutdownController,
) -> anyhow::Result<()> {
    info!("serving plain HTTP");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_ctrl.http_token().cancelled_owned())
        .await?;
    Ok(())
}

/// Serves TLS connections using `axum-server` with rustls.
///
/// Reuses the pre-bound TCP listener by converting it to a `std::net::TcpListener`.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls_config: &TlsConfig,
    shutdown_ctrl: &ShutdownController,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    let token = shutdown_ctrl.http_token();

    tokio::spawn(async move {
        token.cancelled().await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!(%addr, "serving TLS");

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}
