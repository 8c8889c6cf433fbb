use thiserror::Error;

/// Failure raised by an agent.
///
/// The worker may dead-letter `Permanent` failures immediately when configured
/// to; `Retryable` failures always go back on the queue until the retry
/// ceiling is hit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Permanent(String),

    #[error("{0}")]
    Retryable(String),
}

impl AgentError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}
