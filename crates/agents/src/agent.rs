use async_trait::async_trait;
use serde_json::Value as JsonValue;

use agentflow_core::JobId;

use crate::{AgentDescriptor, AgentError, ProgressReporter};

/// Per-execution context handed to an agent.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub job_id: JobId,
    /// Zero on the first execution.
    pub attempt: u32,
    pub progress: ProgressReporter,
}

impl AgentContext {
    pub fn new(job_id: JobId, attempt: u32, progress: ProgressReporter) -> Self {
        Self {
            job_id,
            attempt,
            progress,
        }
    }

    /// Context with a progress reporter that goes nowhere.
    pub fn detached(job_id: JobId) -> Self {
        Self::new(job_id, 0, ProgressReporter::noop(job_id))
    }
}

/// A named, registered unit of computation.
///
/// Implementations must be safe to run more than once for the same job:
/// queue delivery is at-least-once.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    fn descriptor(&self) -> AgentDescriptor;

    async fn execute(&self, input: JsonValue, ctx: &AgentContext) -> Result<JsonValue, AgentError>;
}
