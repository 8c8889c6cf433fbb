//! `agentflow-agents`
//!
//! **Responsibility:** the executor boundary.
//!
//! Agents are opaque units of work: structured input in, structured output
//! (or an error) out. The orchestration core looks them up by name in an
//! `AgentRegistry` and never inspects what they compute.

pub mod agent;
pub mod builtin;
pub mod descriptor;
pub mod error;
pub mod progress;
pub mod registry;

pub use agent::{Agent, AgentContext};
pub use builtin::{EchoAgent, TextStatsAgent};
pub use descriptor::{AgentDescriptor, ComplexityTier, CostEstimate};
pub use error::AgentError;
pub use progress::{NoopProgress, ProgressReporter, ProgressSink};
pub use registry::AgentRegistry;
