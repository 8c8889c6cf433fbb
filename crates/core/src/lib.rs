//! `agentflow-core` — shared identifiers and the orchestration error taxonomy.
//!
//! This crate has no IO and no async; every other crate builds on it.

pub mod error;
pub mod id;

pub use error::{OrchestratorError, OrchestratorResult};
pub use id::{ApiKeyId, JobId, OrganizationId, ProjectId, UserId};
