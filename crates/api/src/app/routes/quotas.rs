use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, Json};

use crate::app::{errors, services::AppServices};
use crate::context::RequestCredential;

pub async fn get_quotas(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<RequestCredential>,
) -> axum::response::Response {
    match services.jobs.quota_report(caller.credential()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
