//! Job descriptor (queue message) and job context (pollable state).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use agentflow_auth::CallerIdentity;
use agentflow_core::{JobId, OrganizationId, ProjectId, UserId};

/// Who submitted a job. Carried on the message so the worker can charge
/// usage, and on the context so reads can be scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOwner {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub project_id: Option<ProjectId>,
}

impl From<&CallerIdentity> for JobOwner {
    fn from(identity: &CallerIdentity) -> Self {
        Self {
            user_id: identity.user_id,
            organization_id: identity.organization_id,
            project_id: identity.project_id,
        }
    }
}

/// Message body placed on the queue.
///
/// `retry_count` travels with the message: retries are fresh enqueues, not
/// redeliveries, so the counter must be carried forward explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    pub job_id: JobId,
    pub task_name: String,
    pub input: JsonValue,
    /// Advisory only; the queue does not order by it.
    #[serde(default)]
    pub priority: i32,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
    #[serde(default)]
    pub retry_count: u32,
    pub owner: JobOwner,
}

impl JobDescriptor {
    pub fn new(job_id: JobId, task_name: impl Into<String>, input: JsonValue, owner: JobOwner) -> Self {
        Self {
            job_id,
            task_name: task_name.into(),
            input,
            priority: 0,
            submitted_at: Utc::now(),
            metadata: Map::new(),
            retry_count: 0,
            owner,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, JsonValue>) -> Self {
        self.metadata = metadata;
        self
    }

    /// The message to enqueue for the next attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Pollable per-job state, stored whole and overwritten whole.
///
/// `result` is present only when `Completed`, `error` only when `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContext {
    pub job_id: JobId,
    pub task_name: String,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    /// Error of the most recent failed attempt, kept while a retry is queued.
    pub last_error: Option<String>,
    pub priority: i32,
    pub metadata: Map<String, JsonValue>,
    pub owner: JobOwner,
    pub attempts: u32,
    pub history: Vec<AttemptRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl JobContext {
    /// Initial context written at submission.
    pub fn queued(descriptor: &JobDescriptor) -> Self {
        Self {
            job_id: descriptor.job_id,
            task_name: descriptor.task_name.clone(),
            status: JobStatus::Queued,
            progress: 0,
            result: None,
            error: None,
            last_error: None,
            priority: descriptor.priority,
            metadata: descriptor.metadata.clone(),
            owner: descriptor.owner,
            attempts: descriptor.retry_count,
            history: Vec::new(),
            created_at: descriptor.submitted_at,
            updated_at: descriptor.submitted_at,
            started_at: None,
            duration_ms: None,
        }
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.progress = 10;
        self.attempts += 1;
        self.started_at = Some(now);
        self.updated_at = now;
    }

    /// Monotonic while running; returns whether anything changed.
    pub fn record_progress(&mut self, progress: u8, now: DateTime<Utc>) -> bool {
        let progress = progress.min(100);
        if self.status != JobStatus::Running || progress <= self.progress {
            return false;
        }
        self.progress = progress;
        self.updated_at = now;
        true
    }

    pub fn mark_completed(&mut self, result: JsonValue, now: DateTime<Utc>) {
        let duration_ms = self.close_attempt(now, None);
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.error = None;
        self.duration_ms = Some(duration_ms);
        self.updated_at = now;
    }

    /// Failed attempt that will be retried.
    pub fn mark_requeued(&mut self, error: String, now: DateTime<Utc>) {
        self.close_attempt(now, Some(error.clone()));
        self.status = JobStatus::Queued;
        self.progress = 0;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Terminal failure.
    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        if self.status == JobStatus::Running {
            self.close_attempt(now, Some(error.clone()));
        }
        self.status = JobStatus::Failed;
        self.result = None;
        self.last_error = Some(error.clone());
        self.error = Some(error);
        self.updated_at = now;
    }

    fn close_attempt(&mut self, now: DateTime<Utc>, error: Option<String>) -> u64 {
        let started_at = self.started_at.unwrap_or(now);
        let duration_ms = (now - started_at).num_milliseconds().max(0) as u64;
        self.history.push(AttemptRecord {
            attempt: self.attempts,
            started_at,
            finished_at: now,
            success: error.is_none(),
            error,
            duration_ms,
        });
        duration_ms
    }
}

/// Returned to the submitter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: JobId,
    pub task_name: String,
    pub status: JobStatus,
    #[serde(with = "duration_secs")]
    pub estimated_duration: Duration,
    pub created_at: DateTime<Utc>,
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner() -> JobOwner {
        JobOwner {
            user_id: UserId::new(),
            organization_id: OrganizationId::new(),
            project_id: None,
        }
    }

    #[test]
    fn descriptor_wire_format_is_camel_case() {
        let d = JobDescriptor::new(JobId::new(), "Echo", json!({"msg": "hi"}), owner());
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["taskName"], "Echo");
        assert_eq!(v["retryCount"], 0);
        let back: JobDescriptor = serde_json::from_value(v).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn next_attempt_only_bumps_retry_count() {
        let d = JobDescriptor::new(JobId::new(), "Echo", json!(null), owner()).with_priority(5);
        let next = d.next_attempt();
        assert_eq!(next.retry_count, 1);
        assert_eq!(next.job_id, d.job_id);
        assert_eq!(next.priority, 5);
    }

    #[test]
    fn happy_path_lifecycle() {
        let d = JobDescriptor::new(JobId::new(), "Echo", json!({}), owner());
        let mut ctx = JobContext::queued(&d);
        assert_eq!((ctx.status, ctx.progress), (JobStatus::Queued, 0));

        let start = Utc::now();
        ctx.mark_running(start);
        assert_eq!((ctx.status, ctx.progress, ctx.attempts), (JobStatus::Running, 10, 1));

        assert!(ctx.record_progress(60, start));
        assert!(!ctx.record_progress(30, start));
        assert_eq!(ctx.progress, 60);

        ctx.mark_completed(json!({"ok": true}), start + chrono::Duration::milliseconds(250));
        assert_eq!(ctx.status, JobStatus::Completed);
        assert_eq!(ctx.progress, 100);
        assert_eq!(ctx.duration_ms, Some(250));
        assert!(ctx.error.is_none());
        assert_eq!(ctx.history.len(), 1);
        assert!(ctx.history[0].success);
    }

    #[test]
    fn requeue_then_fail() {
        let d = JobDescriptor::new(JobId::new(), "Flaky", json!({}), owner());
        let mut ctx = JobContext::queued(&d);
        let now = Utc::now();

        ctx.mark_running(now);
        ctx.mark_requeued("boom".into(), now);
        assert_eq!(ctx.status, JobStatus::Queued);
        assert!(ctx.error.is_none());
        assert_eq!(ctx.last_error.as_deref(), Some("boom"));
        assert!(!ctx.record_progress(50, now));

        ctx.mark_running(now);
        ctx.mark_failed("max retries (1) exceeded: boom".into(), now);
        assert_eq!(ctx.status, JobStatus::Failed);
        assert!(ctx.result.is_none());
        assert_eq!(ctx.attempts, 2);
        assert_eq!(ctx.history.len(), 2);
    }

    #[test]
    fn handle_serialises_estimate_in_seconds() {
        let handle = JobHandle {
            job_id: JobId::new(),
            task_name: "Echo".into(),
            status: JobStatus::Queued,
            estimated_duration: Duration::from_secs(30),
            created_at: Utc::now(),
        };
        let v = serde_json::to_value(&handle).unwrap();
        assert_eq!(v["estimatedDuration"], 30);
        assert_eq!(v["status"], "queued");
    }
}
