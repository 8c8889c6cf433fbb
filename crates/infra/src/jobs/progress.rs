use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use agentflow_agents::ProgressSink;
use agentflow_core::JobId;

use crate::context_store::JobContextStore;

/// Writes agent progress into the job context (read-modify-write).
pub struct ContextProgressSink {
    contexts: Arc<dyn JobContextStore>,
    ttl: Duration,
}

impl ContextProgressSink {
    pub fn new(contexts: Arc<dyn JobContextStore>, ttl: Duration) -> Self {
        Self { contexts, ttl }
    }
}

#[async_trait]
impl ProgressSink for ContextProgressSink {
    async fn record(&self, job_id: JobId, progress: u8) {
        let Some(mut ctx) = self.contexts.get(job_id).await else {
            return;
        };
        if !ctx.record_progress(progress, Utc::now()) {
            return;
        }
        if let Err(e) = self.contexts.put(&ctx, self.ttl).await {
            warn!(job_id = %job_id, error = %e, "failed to persist progress");
        }
    }
}
