//! Infrastructure layer: job model, stores, queue, worker, gateways, config.
//!
//! Every store is a trait with an in-memory implementation; Redis-backed
//! implementations are compiled in with the `redis` feature.

pub mod config;
pub mod context_store;
pub mod jobs;
pub mod queue;

#[cfg(feature = "redis")]
pub mod api_key_store;
#[cfg(feature = "redis")]
pub mod usage_store;


pub use config::{ConfigError, Settings};
pub use context_store::{ContextStoreError, InMemoryContextStore, JobContextStore};
pub use jobs::{
    JobContext, JobDescriptor, JobHandle, JobOwner, JobService, JobStatus, SubmitJob, Worker,
    WorkerConfig, WorkerHandle, WorkerStats,
};
pub use queue::{InMemoryJobQueue, JobQueue, QueueError, Receipt, ReceivedMessage};
