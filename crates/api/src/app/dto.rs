use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use agentflow_auth::{ApiKeySummary, IssuedApiKey};
use agentflow_core::JobId;
use agentflow_infra::{JobContext, JobStatus};

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub task_name: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Milliseconds, once the job completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl From<JobContext> for JobStatusResponse {
    fn from(ctx: JobContext) -> Self {
        let completed = ctx.status == JobStatus::Completed;
        let failed = ctx.status == JobStatus::Failed;
        Self {
            job_id: ctx.job_id,
            task_name: ctx.task_name,
            status: ctx.status,
            progress: ctx.progress,
            result: ctx.result.filter(|_| completed),
            error: ctx.error.filter(|_| failed),
            last_error: ctx.last_error.filter(|_| !completed),
            attempts: ctx.attempts,
            created_at: ctx.created_at,
            updated_at: ctx.updated_at,
            duration: ctx.duration_ms,
        }
    }
}

/// Body of `GET /jobs/:id/result` while the job is not terminal.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPendingResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub processing: bool,
}

impl From<&JobContext> for ResultPendingResponse {
    fn from(ctx: &JobContext) -> Self {
        Self {
            job_id: ctx.job_id,
            status: ctx.status,
            progress: ctx.progress,
            processing: true,
        }
    }
}

/// The plaintext key appears here and nowhere else. No `Debug`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedKeyResponse {
    pub key: String,
    #[serde(flatten)]
    pub summary: ApiKeySummary,
}

impl From<IssuedApiKey> for CreatedKeyResponse {
    fn from(issued: IssuedApiKey) -> Self {
        Self {
            key: issued.key,
            summary: issued.summary,
        }
    }
}
