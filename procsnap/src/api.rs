//! HTTP surface: `POST /api/process-data/` and `GET /api/latest/`.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, info};

use crate::error::{IngestError, QueryError};
use crate::state::AppState;

// Large hosts report thousands of processes with full command lines.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/process-data/", post(ingest_snapshot))
        .route("/latest/", get(latest_snapshot))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));
    Router::new().nest("/api", api).with_state(state)
}

async fn ingest_snapshot(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let credential = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let svc = state.ingest.clone();
    let joined =
        tokio::task::spawn_blocking(move || svc.ingest(&body, credential.as_deref())).await;
    match joined {
        Ok(Ok(id)) => {
            info!(id, "snapshot saved");
            (StatusCode::CREATED, Json(json!({"message": "Data saved"}))).into_response()
        }
        Ok(Err(IngestError::Unauthorized)) => {
            (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"}))).into_response()
        }
        Ok(Err(IngestError::InvalidPayload(errs))) => {
            (StatusCode::BAD_REQUEST, Json(errs)).into_response()
        }
        Ok(Err(IngestError::Storage(e))) => {
            error!("failed to store snapshot: {e}");
            storage_failure()
        }
        Err(e) => {
            error!("ingest task failed: {e}");
            storage_failure()
        }
    }
}

async fn latest_snapshot(State(state): State<AppState>) -> Response {
    let svc = state.query.clone();
    match tokio::task::spawn_blocking(move || svc.latest()).await {
        Ok(Ok(view)) => Json(view).into_response(),
        Ok(Err(QueryError::NotFound)) => {
            (StatusCode::NOT_FOUND, Json(json!({"error": "No data"}))).into_response()
        }
        Ok(Err(QueryError::Storage(e))) => {
            error!("failed to load latest snapshot: {e}");
            storage_failure()
        }
        Err(e) => {
            error!("query task failed: {e}");
            storage_failure()
        }
    }
}

fn storage_failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Storage failure"})),
    )
        .into_response()
}
