//! Record ingestion and read handlers.
//!
//! - `POST /records`: validate, cache, enqueue; 201 once queued
//! - `GET /records/{id}`: cache first, forward-once on miss
//! - `GET /records?t=term`: storage search
//! - `GET /records/count`: storage count

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use recordline_core::{
    ForwardMarker, NewRecord, Record, RecordId, RequestContext, FORWARD_HEADER,
    FORWARD_HEADER_VALUE,
};
use serde::Deserialize;
use tracing::debug;

use super::AppState;
use crate::cache::LookupOutcome;
use crate::network::error::ApiError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Accepts one record. A 201 means the record is readable from this
/// instance's cache and queued for storage, not that it is durable.
pub async fn create_record(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload =
        NewRecord::from_json(&body).map_err(|err| ApiError::InvalidBody(vec![err.to_string()]))?;
    let record = payload
        .accept(RecordId::new_v4(), &state.limits)
        .map_err(|invalid| ApiError::InvalidBody(invalid.errors().to_vec()))?;

    let id = state.ingress.submit(record.clone()).await?;
    debug!(%id, "record accepted");

    Ok((
        StatusCode::CREATED,
        [(LOCATION, format!("/records/{id}"))],
        Json(record),
    )
        .into_response())
}

/// Point lookup following the forward-once protocol.
pub async fn get_record(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let ctx = request_context(&headers);
    let response = match state.lookup.find_raw(&raw_id, ctx).await? {
        LookupOutcome::Cached(record) | LookupOutcome::Stored(record) => {
            Json(record).into_response()
        }
        LookupOutcome::Forward => {
            (StatusCode::NOT_FOUND, [(FORWARD_HEADER, FORWARD_HEADER_VALUE)]).into_response()
        }
        LookupOutcome::NotFound => StatusCode::NOT_FOUND.into_response(),
    };
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub t: Option<String>,
}

/// Literal substring search over name, nickname and tags.
pub async fn search_records(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let term = params
        .t
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::InvalidQuery("query parameter t is required".to_string()))?;
    let found = state.storage.search_by_text(&term, state.search_limit).await?;
    Ok(Json(found))
}

/// Number of durable records. Records still in the pipeline are not counted.
pub async fn count_records(State(state): State<AppState>) -> Result<Json<u64>, ApiError> {
    Ok(Json(state.storage.count().await?))
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    RequestContext::new(
        header(REQUEST_ID_HEADER).map(str::to_string),
        ForwardMarker::from_header(header(FORWARD_HEADER)),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;
    use crate::cache::RecordLookup;
    use crate::network::handlers::test_state::{test_app, test_app_with};
    use crate::network::module::build_router;
    use crate::network::NetworkConfig;
    use crate::storage::{MemoryStorage, StorageError};
    use crate::traits::StorageBackend;

    const ADA: &str =
        r#"{"name":"Ada Lovelace","nickname":"ada","birth_date":"1815-12-10","tags":["math","engines"]}"#;

    fn router(state: AppState) -> Router {
        build_router(state, &NetworkConfig::default())
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        (status, headers, body)
    }

    fn post(body: &str) -> Request<Body> {
        Request::post("/records")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str, forwarded: bool) -> Request<Body> {
        let mut builder = Request::get(uri);
        if forwarded {
            builder = builder.header(FORWARD_HEADER, FORWARD_HEADER_VALUE);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn create(router: &Router, body: &str) -> String {
        let (status, headers, _) = call(router, post(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        headers[LOCATION].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn create_returns_location_and_is_readable_immediately() {
        let app = test_app();
        let router = router(app.state.clone());

        let location = create(&router, ADA).await;
        assert!(location.starts_with("/records/"));

        let (status, headers, body) = call(&router, get(&location, false)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(FORWARD_HEADER).is_none());
        let record: Record = serde_json::from_slice(&body).unwrap();
        assert_eq!(record.name, "Ada Lovelace");
        assert_eq!(record.tags, vec!["math", "engines"]);
        assert_eq!(format!("/records/{}", record.id), location);
    }

    #[tokio::test]
    async fn create_rejects_malformed_json() {
        let app = test_app();
        let (status, _, _) = call(&router(app.state.clone()), post("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(app.state.cache.is_empty());
    }

    #[tokio::test]
    async fn create_rejects_positional_array_body() {
        let app = test_app();
        let body = r#"["Ada Lovelace","ada","1815-12-10",["math"]]"#;
        let (status, _, _) = call(&router(app.state.clone()), post(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(app.state.cache.is_empty());
    }

    #[tokio::test]
    async fn create_reports_every_validation_error() {
        let app = test_app();
        let body = r#"{"nickname":"","birth_date":"1815-13-40","tags":[""]}"#;

        let (status, _, bytes) = call(&router(app.state.clone()), post(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["errors"].as_array().unwrap().len() >= 3);
        assert_eq!(app.state.pipeline.snapshot().records_ingested, 0);
    }

    #[tokio::test]
    async fn create_after_pipeline_shutdown_is_unavailable() {
        let app = test_app();
        let router = router(app.state.clone());
        app.pipeline.shutdown(Duration::from_secs(5)).await;

        let (status, _, _) = call(&router, post(ADA)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(app.state.cache.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = test_app();
        let config = NetworkConfig {
            body_limit_bytes: 16,
            ..NetworkConfig::default()
        };
        let router = build_router(app.state.clone(), &config);

        let (status, _, _) = call(&router, post(ADA)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(app.state.cache.is_empty());
    }

    #[tokio::test]
    async fn body_within_configured_limit_is_accepted() {
        let app = test_app();
        let config = NetworkConfig {
            body_limit_bytes: ADA.len(),
            ..NetworkConfig::default()
        };
        let router = build_router(app.state.clone(), &config);

        let (status, _, _) = call(&router, post(ADA)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn unmarked_miss_returns_404_with_marker() {
        let app = test_app();
        let uri = format!("/records/{}", RecordId::new_v4());

        let (status, headers, _) = call(&router(app.state.clone()), get(&uri, false)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(headers[FORWARD_HEADER], FORWARD_HEADER_VALUE);
    }

    #[tokio::test]
    async fn marked_miss_returns_final_404_without_marker() {
        let app = test_app();
        let uri = format!("/records/{}", RecordId::new_v4());

        let (status, headers, _) = call(&router(app.state.clone()), get(&uri, true)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(headers.get(FORWARD_HEADER).is_none());
    }

    #[tokio::test]
    async fn malformed_id_is_final_404() {
        let app = test_app();
        let (status, headers, _) =
            call(&router(app.state.clone()), get("/records/not-a-uuid", false)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(headers.get(FORWARD_HEADER).is_none());
    }

    #[tokio::test]
    async fn second_instance_forwards_then_serves_from_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let a = test_app_with(Arc::clone(&storage));
        let b = test_app_with(Arc::clone(&storage));
        let router_a = router(a.state.clone());
        let router_b = router(b.state.clone());

        let location = create(&router_a, ADA).await;

        let (status, headers, _) = call(&router_b, get(&location, false)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(headers[FORWARD_HEADER], FORWARD_HEADER_VALUE);

        a.pipeline.shutdown(Duration::from_secs(5)).await;

        let (status, headers, body) = call(&router_b, get(&location, true)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(FORWARD_HEADER).is_none());
        let record: Record = serde_json::from_slice(&body).unwrap();
        assert_eq!(record.nickname, "ada");
    }

    struct BrokenStorage;

    #[async_trait]
    impl StorageBackend for BrokenStorage {
        async fn bulk_write(&self, _records: &[Record]) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }
        async fn find_by_id(&self, _id: RecordId) -> Result<Option<Record>, StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }
        async fn search_by_text(&self, _term: &str, _limit: usize) -> Result<Vec<Record>, StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }
        async fn count(&self) -> Result<u64, StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }
        async fn initialize(&self) -> Result<(), StorageError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), StorageError> {
            Ok(())
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn broken_state() -> (AppState, crate::network::handlers::test_state::TestApp) {
        let app = test_app();
        let mut state = app.state.clone();
        let storage: Arc<dyn StorageBackend> = Arc::new(BrokenStorage);
        state.lookup = RecordLookup::new(Arc::clone(&state.cache), Arc::clone(&storage));
        state.storage = storage;
        (state, app)
    }

    #[tokio::test]
    async fn storage_error_on_forwarded_hop_is_503_without_marker() {
        let (state, _app) = broken_state();
        let uri = format!("/records/{}", RecordId::new_v4());

        let (status, headers, _) = call(&router(state), get(&uri, true)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(headers.get(FORWARD_HEADER).is_none());
    }

    #[tokio::test]
    async fn search_and_count_read_storage() {
        let app = test_app();
        let router = router(app.state.clone());
        create(&router, ADA).await;
        create(
            &router,
            r#"{"name":"Grace Hopper","nickname":"amazing grace","birth_date":"1906-12-09","tags":["cobol"]}"#,
        )
        .await;
        app.pipeline.shutdown(Duration::from_secs(5)).await;
        assert_eq!(app.storage.len(), 2);

        let (status, _, body) = call(&router, get("/records?t=engines", false)).await;
        assert_eq!(status, StatusCode::OK);
        let found: Vec<Record> = serde_json::from_slice(&body).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].nickname, "ada");

        let (_, _, body) = call(&router, get("/records?t=zzz", false)).await;
        assert_eq!(&body[..], b"[]");

        let (status, _, body) = call(&router, get("/records/count", false)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"2");
    }

    #[tokio::test]
    async fn search_requires_non_empty_term() {
        let app = test_app();
        let router = router(app.state.clone());

        let (status, _, _) = call(&router, get("/records", false)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = call(&router, get("/records?t=", false)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn search_storage_error_is_503() {
        let (state, _app) = broken_state();
        let (status, _, _) = call(&router(state), get("/records?t=ada", false)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
