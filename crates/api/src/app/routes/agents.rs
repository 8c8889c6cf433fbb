use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, Json};

use crate::app::{errors, services::AppServices};
use crate::context::RequestCredential;

pub async fn list_agents(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<RequestCredential>,
) -> axum::response::Response {
    match services.jobs.list_agents(caller.credential()).await {
        Ok(agents) => Json(agents).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
