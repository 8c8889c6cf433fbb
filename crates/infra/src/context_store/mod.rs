//! Job context store: whole-record put/get with expiry.
//!
//! - `put` overwrites unconditionally and resets the TTL (last writer wins).
//! - `get` never surfaces transport errors: an unreadable or missing entry is
//!   `None`. Only `health_check` reports store failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use agentflow_core::JobId;

use crate::jobs::JobContext;

mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryContextStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextStoreError {
    #[error("context store unavailable: {0}")]
    Unavailable(String),

    #[error("context serialization failed: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait JobContextStore: Send + Sync {
    async fn put(&self, context: &JobContext, ttl: Duration) -> Result<(), ContextStoreError>;

    async fn get(&self, job_id: JobId) -> Option<JobContext>;

    async fn health_check(&self) -> Result<(), ContextStoreError>;
}

#[async_trait]
impl<T: JobContextStore + ?Sized> JobContextStore for Arc<T> {
    async fn put(&self, context: &JobContext, ttl: Duration) -> Result<(), ContextStoreError> {
        (**self).put(context, ttl).await
    }

    async fn get(&self, job_id: JobId) -> Option<JobContext> {
        (**self).get(job_id).await
    }

    async fn health_check(&self) -> Result<(), ContextStoreError> {
        (**self).health_check().await
    }
}
