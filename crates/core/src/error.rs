//! Orchestration error model.

use thiserror::Error;

/// Result type used across the orchestration layer.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors surfaced synchronously to callers of the gateways.
///
/// Executor failures never reach a synchronous caller; they are recorded in the
/// job context. `Executor` exists so adapters can describe them uniformly.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrchestratorError {
    /// Missing, malformed, expired or revoked credential.
    #[error("authentication failed")]
    Authentication,

    /// Valid identity lacking the required permission.
    #[error("{0}")]
    Authorization(String),

    /// A quota limit would be exceeded. Carries the attempted usage snapshot.
    #[error("quota exceeded")]
    QuotaExceeded { usage: serde_json::Value },

    /// The requested task name is not registered.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// Malformed submission payload or identifier.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown or expired job / key.
    #[error("not found")]
    NotFound,

    /// Queue or store temporarily unreachable.
    #[error("infrastructure unavailable: {0}")]
    TransientInfrastructure(String),

    /// The task itself failed.
    #[error("executor failed: {0}")]
    Executor(String),
}

impl OrchestratorError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unknown_task(name: impl Into<String>) -> Self {
        Self::UnknownTask(name.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientInfrastructure(msg.into())
    }

    pub fn executor(msg: impl Into<String>) -> Self {
        Self::Executor(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Stable machine-readable code (used in API error bodies and logs).
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication_error",
            Self::Authorization(_) => "authorization_error",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::UnknownTask(_) => "unknown_task",
            Self::Validation(_) => "validation_error",
            Self::NotFound => "not_found",
            Self::TransientInfrastructure(_) => "service_unavailable",
            Self::Executor(_) => "executor_error",
        }
    }
}
