//! Built-in agents.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use crate::{Agent, AgentContext, AgentDescriptor, AgentError, ComplexityTier};

/// Returns its input unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor::new("Echo", "Returns the input payload unchanged", "utility")
            .with_io(json!({ "type": "any" }), json!({ "type": "any" }))
            .with_cost(1.0, 0.0)
            .with_complexity(ComplexityTier::Simple)
    }

    async fn execute(&self, input: JsonValue, _ctx: &AgentContext) -> Result<JsonValue, AgentError> {
        Ok(input)
    }
}

/// Counts characters, words and lines of `input.text`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextStatsAgent;

#[async_trait]
impl Agent for TextStatsAgent {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor::new("TextStats", "Character, word and line counts for a text", "text")
            .with_io(
                json!({ "text": "string" }),
                json!({ "characters": "integer", "words": "integer", "lines": "integer" }),
            )
            .with_cost(1.0, 0.001)
            .with_complexity(ComplexityTier::Simple)
    }

    async fn execute(&self, input: JsonValue, ctx: &AgentContext) -> Result<JsonValue, AgentError> {
        let text = input
            .get("text")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AgentError::invalid_input("expected a string field `text`"))?;

        ctx.progress.report(50).await;
        Ok(json!({
            "characters": text.chars().count(),
            "words": text.split_whitespace().count(),
            "lines": text.lines().count(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::JobId;

    #[tokio::test]
    async fn echo_returns_input() {
        let input = json!({ "msg": "hi" });
        let out = EchoAgent
            .execute(input.clone(), &AgentContext::detached(JobId::new()))
            .await
            .unwrap();
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn text_stats_counts() {
        let ctx = AgentContext::detached(JobId::new());
        let out = TextStatsAgent
            .execute(json!({ "text": "hello world\nbye" }), &ctx)
            .await
            .unwrap();
        assert_eq!(out, json!({ "characters": 15, "words": 3, "lines": 2 }));
        assert_eq!(ctx.progress.current(), 50);
    }

    #[tokio::test]
    async fn text_stats_rejects_missing_text() {
        let err = TextStatsAgent
            .execute(json!({ "body": 1 }), &AgentContext::detached(JobId::new()))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
