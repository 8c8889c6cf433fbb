use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::app::{errors, services::AppServices};

/// Liveness: the process is up.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Readiness: queue and context store both answer.
pub async fn ready(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.jobs.readiness().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
