//! Health, liveness, and readiness endpoint handlers.
//!
//! These handlers expose server health information for orchestrators
//! (Kubernetes, load balancers) and operational monitoring.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Returns detailed health information as JSON.
///
/// Always returns 200 -- the `state` field in the response body indicates
/// whether the server is actually healthy. The `pipeline` object carries the
/// queue depths and the written, dead-lettered and dropped record counters.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.shutdown.health_state();

    Json(json!({
        "state": health.as_str(),
        "node_id": &*state.node_id,
        "storage": state.storage.name(),
        "cache_entries": state.cache.len(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "pipeline": state.pipeline.snapshot(),
    }))
}

/// Kubernetes liveness probe -- always returns 200 OK.
///
/// The liveness probe only checks whether the process is running and
/// responsive. It intentionally does not check downstream dependencies
/// or health state, because a failed liveness probe triggers a pod restart.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe -- 200 when ready and the pipeline accepts records,
/// 503 otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready && !state.ingress.is_closed() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::network::handlers::test_state::test_app;
    use crate::test_support::record;

    #[tokio::test]
    async fn health_handler_returns_json_with_all_fields() {
        let app = test_app();
        app.state.shutdown.set_ready();

        let json = health_handler(State(app.state.clone())).await.0;

        assert_eq!(json["state"], "ready");
        assert_eq!(json["node_id"], "test-node");
        assert_eq!(json["storage"], "memory");
        assert_eq!(json["cache_entries"], 0);
        assert_eq!(json["in_flight"], 0);
        assert!(json["uptime_secs"].is_number());
        assert_eq!(json["pipeline"]["accepting"], true);
        assert_eq!(json["pipeline"]["records_ingested"], 0);
    }

    #[tokio::test]
    async fn health_handler_reports_starting_state() {
        let app = test_app();
        let json = health_handler(State(app.state.clone())).await.0;
        assert_eq!(json["state"], "starting");
    }

    #[tokio::test]
    async fn health_handler_reports_ingested_records() {
        let app = test_app();
        app.state.ingress.submit(record("ada")).await.unwrap();

        let json = health_handler(State(app.state.clone())).await.0;
        assert_eq!(json["cache_entries"], 1);
        assert_eq!(json["pipeline"]["records_ingested"], 1);
    }

    #[tokio::test]
    async fn health_handler_reports_in_flight_count() {
        let app = test_app();
        let _guard = app.state.shutdown.in_flight_guard();

        let json = health_handler(State(app.state.clone())).await.0;
        assert_eq!(json["in_flight"], 1);
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let app = test_app();
        assert_eq!(
            readiness_handler(State(app.state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        app.state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(app.state.clone())).await, StatusCode::OK);

        app.state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(app.state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn readiness_fails_once_pipeline_is_closed() {
        let app = test_app();
        app.state.shutdown.set_ready();
        app.pipeline.shutdown(Duration::from_secs(5)).await;

        assert_eq!(
            readiness_handler(State(app.state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
