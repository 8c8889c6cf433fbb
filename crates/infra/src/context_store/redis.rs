//! Redis-backed job context store: one JSON string per job under
//! `agentflow:job:<job_id>`, written with `SET ... EX`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{instrument, warn};

use agentflow_core::JobId;

use super::{ContextStoreError, JobContextStore};
use crate::jobs::JobContext;

pub const DEFAULT_KEY_PREFIX: &str = "agentflow:job";

#[derive(Clone)]
pub struct RedisContextStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl core::fmt::Debug for RedisContextStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisContextStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

fn unavailable(e: redis::RedisError) -> ContextStoreError {
    ContextStoreError::Unavailable(e.to_string())
}

impl RedisContextStore {
    pub async fn connect(redis_url: &str) -> Result<Self, ContextStoreError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn key(&self, job_id: JobId) -> String {
        format!("{}:{}", self.key_prefix, job_id)
    }
}

#[async_trait]
impl JobContextStore for RedisContextStore {
    #[instrument(skip(self, context), fields(job_id = %context.job_id, status = %context.status), err)]
    async fn put(&self, context: &JobContext, ttl: Duration) -> Result<(), ContextStoreError> {
        let json =
            serde_json::to_string(context).map_err(|e| ContextStoreError::Serialization(e.to_string()))?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(self.key(context.job_id))
            .arg(json)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Option<JobContext> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = match redis::cmd("GET").arg(self.key(job_id)).query_async(&mut conn).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "context read failed; treating as absent");
                return None;
            }
        };
        match serde_json::from_str(&raw?) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "corrupt job context; treating as absent");
                None
            }
        }
    }

    async fn health_check(&self) -> Result<(), ContextStoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
