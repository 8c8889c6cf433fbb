use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use agentflow_auth::CreateApiKey;
use agentflow_core::{ApiKeyId, OrchestratorError};

use crate::app::{dto, errors, services::AppServices};
use crate::context::RequestCredential;

pub async fn create_key(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<RequestCredential>,
    body: Result<Json<CreateApiKey>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services.keys.create_key(caller.credential(), body).await {
        Ok(issued) => (StatusCode::CREATED, Json(dto::CreatedKeyResponse::from(issued))).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn list_keys(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<RequestCredential>,
) -> axum::response::Response {
    match services.keys.list_keys(caller.credential()).await {
        Ok(keys) => Json(keys).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn revoke_key(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<RequestCredential>,
    Path(key_id): Path<String>,
) -> axum::response::Response {
    // A malformed id cannot name an existing key.
    let key_id: ApiKeyId = match key_id.parse() {
        Ok(id) => id,
        Err(_) => return errors::orchestrator_error_to_response(OrchestratorError::not_found()),
    };

    match services.keys.revoke_key(caller.credential(), key_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
