use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use agentflow_infra::SubmitJob;

use crate::app::{dto, errors, services::AppServices};
use crate::context::RequestCredential;

pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<RequestCredential>,
    body: Result<Json<SubmitJob>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services.jobs.submit(caller.credential(), body).await {
        Ok(handle) => (StatusCode::ACCEPTED, Json(handle)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<RequestCredential>,
    Path(job_id): Path<String>,
) -> axum::response::Response {
    match services.jobs.get_status(caller.credential(), &job_id).await {
        Ok(ctx) => Json(dto::JobStatusResponse::from(ctx)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

/// 202 with a processing marker until the job is terminal, then 200.
pub async fn get_job_result(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<RequestCredential>,
    Path(job_id): Path<String>,
) -> axum::response::Response {
    match services.jobs.get_result(caller.credential(), &job_id).await {
        Ok(ctx) if !ctx.status.is_terminal() => {
            (StatusCode::ACCEPTED, Json(dto::ResultPendingResponse::from(&ctx))).into_response()
        }
        Ok(ctx) => Json(dto::JobStatusResponse::from(ctx)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
