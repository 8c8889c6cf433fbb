use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::warn;

use agentflow_core::JobId;

use super::{ContextStoreError, JobContextStore};
use crate::jobs::JobContext;

/// In-process context store for tests/dev. Expiry uses tokio's clock so
/// paused-time tests can fast-forward past the retention window.
#[derive(Debug, Default)]
pub struct InMemoryContextStore {
    entries: RwLock<HashMap<JobId, (JobContext, Instant)>>,
}

fn poison_err<T>(_: PoisonError<T>) -> ContextStoreError {
    ContextStoreError::Unavailable("context store lock poisoned".to_string())
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        match self.entries.write() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, (_, expires_at)| *expires_at > now);
                before - entries.len()
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobContextStore for InMemoryContextStore {
    async fn put(&self, context: &JobContext, ttl: Duration) -> Result<(), ContextStoreError> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        entries.insert(context.job_id, (context.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Option<JobContext> {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(_) => {
                warn!(job_id = %job_id, "context store lock poisoned; treating as absent");
                return None;
            }
        };
        entries
            .get(&job_id)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(ctx, _)| ctx.clone())
    }

    async fn health_check(&self) -> Result<(), ContextStoreError> {
        self.entries.read().map(|_| ()).map_err(poison_err)
    }
}
