//! Durable job queue port.
//!
//! Semantics every implementation provides and the worker relies on:
//!
//! - **At-least-once**: a message stays on the queue until `delete`d with the
//!   receipt from the delivery that processed it.
//! - **Visibility timeout**: a received message is hidden from other receivers
//!   for `visibility_timeout`; if not deleted in that window it reappears.
//! - **Long poll**: `receive_batch` waits up to `wait_time` for a message
//!   before returning an empty batch.
//! - **No ordering guarantee** beyond best-effort FIFO; priority is ignored.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::JobDescriptor;

mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_streams;

pub use in_memory::InMemoryJobQueue;

/// Opaque handle for deleting one specific delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Receipt(String);

impl Receipt {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Receipt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub descriptor: JobDescriptor,
    pub receipt: Receipt,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("queue command failed: {0}")]
    Command(String),

    #[error("message serialization failed: {0}")]
    Serialization(String),

    /// The receipt does not match a current delivery (already deleted, or the
    /// message was redelivered to someone else after its visibility expired).
    #[error("unknown or stale receipt: {0}")]
    InvalidReceipt(Receipt),
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<(), QueueError>;

    async fn receive_batch(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    async fn delete(&self, receipt: &Receipt) -> Result<(), QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;

    /// Messages not yet deleted, visible or not.
    async fn approximate_depth(&self) -> Result<usize, QueueError>;
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        (**self).enqueue(descriptor).await
    }

    async fn receive_batch(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        (**self)
            .receive_batch(max_messages, visibility_timeout, wait_time)
            .await
    }

    async fn delete(&self, receipt: &Receipt) -> Result<(), QueueError> {
        (**self).delete(receipt).await
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        (**self).health_check().await
    }

    async fn approximate_depth(&self) -> Result<usize, QueueError> {
        (**self).approximate_depth().await
    }
}
