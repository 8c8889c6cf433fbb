use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use agentflow_core::OrchestratorError;

/// Map the orchestration error taxonomy onto HTTP.
pub fn orchestrator_error_to_response(err: OrchestratorError) -> axum::response::Response {
    let code = err.code();
    match err {
        OrchestratorError::Authentication => {
            json_error(StatusCode::UNAUTHORIZED, code, "invalid or missing credentials")
        }
        OrchestratorError::Authorization(msg) => json_error(StatusCode::FORBIDDEN, code, msg),
        OrchestratorError::QuotaExceeded { usage } => (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(json!({
                "error": code,
                "message": "quota exceeded",
                "usage": usage,
            })),
        )
            .into_response(),
        e @ OrchestratorError::UnknownTask(_) => json_error(StatusCode::BAD_REQUEST, code, e.to_string()),
        OrchestratorError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, code, msg),
        OrchestratorError::NotFound => json_error(StatusCode::NOT_FOUND, code, "not found"),
        OrchestratorError::TransientInfrastructure(msg) => {
            error!(error = %msg, "infrastructure unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, code, msg)
        }
        OrchestratorError::Executor(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, code, msg),
    }
}

/// Malformed JSON bodies are validation errors like any other.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
