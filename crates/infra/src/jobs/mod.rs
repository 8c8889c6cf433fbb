//! Asynchronous job orchestration.
//!
//! ## Flow
//!
//! caller → `JobService::submit` (identity, permission, quota, registry
//! lookup, initial context, enqueue) → `Worker` (receive, execute, update
//! context, delete or re-enqueue) → caller polls `JobService::get_status`.
//!
//! ## Components
//!
//! - `JobDescriptor`: the queue message, carrying its own retry counter
//! - `JobContext`: pollable state in the context store
//! - `JobService`: submission and status/result gateways
//! - `Worker`: polling loop with parallel execution within a batch

pub mod progress;
pub mod readiness;
pub mod service;
pub mod types;
pub mod worker;

pub use progress::ContextProgressSink;
pub use readiness::check_readiness;
pub use service::{JobService, SubmitJob};
pub use types::{AttemptRecord, JobContext, JobDescriptor, JobHandle, JobOwner, JobStatus};
pub use worker::{MessageOutcome, Worker, WorkerConfig, WorkerHandle, WorkerStats};
