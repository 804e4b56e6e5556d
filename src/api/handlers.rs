//! API request handlers
//!
//! The orchestrator is synchronous and may block on Docker, so lifecycle
//! calls run on the blocking pool.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::types::*;
use crate::Orchestrator;

pub type AppState = Arc<Orchestrator>;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

// === Health ===

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// === Applications ===

pub async fn start_app(
    State(orch): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult<Json<AppView>> {
    let Json(req) = payload.map_err(bad_request)?;
    let app = blocking(move || orch.start(&req.app)).await?;
    Ok(Json(AppView::from(&app)))
}

pub async fn stop_app(
    State(orch): State<AppState>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> ApiResult<Json<AppStatusView>> {
    let Json(req) = payload.map_err(bad_request)?;
    let app = blocking(move || orch.stop(req.id)).await?;
    Ok(Json(AppStatusView::from(&app)))
}

pub async fn list_apps(State(orch): State<AppState>) -> Json<Vec<AppStatusView>> {
    Json(orch.list().iter().map(AppStatusView::from).collect())
}

// === Logs ===

pub async fn app_logs(
    State(orch): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Json<Vec<LogEntryResponse>>> {
    let entries = blocking(move || orch.logs(id)).await?;
    Ok(Json(entries.into_iter().map(LogEntryResponse::from).collect()))
}

// === Helpers ===

async fn blocking<T, F>(call: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> crate::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: "Internal".to_string(),
                    message: e.to_string(),
                }),
            )
        })?
        .map_err(to_api_error)
}

fn to_api_error(e: crate::Error) -> (StatusCode, Json<ApiError>) {
    let status = match &e {
        crate::Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        crate::Error::NotFound(_) => StatusCode::NOT_FOUND,
        crate::Error::DuplicateId(_) | crate::Error::RegistryConflict(_) => StatusCode::CONFLICT,
        crate::Error::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if e.is_client_error() {
        tracing::debug!(error = %e, "Request rejected");
    } else if status.is_server_error() {
        tracing::error!(error = %e, "Request failed");
    } else {
        tracing::warn!(error = %e, "Request refused");
    }

    (status, Json(ApiError {
        error: e.kind().to_string(),
        message: e.to_string(),
    }))
}

fn bad_request(rejection: JsonRejection) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError {
        error: "InvalidArgument".to_string(),
        message: rejection.body_text(),
    }))
}
