use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Declared execution complexity, used only for duration estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Simple,
    Medium,
    Complex,
}

impl ComplexityTier {
    /// Static estimate returned to submitters.
    pub fn estimated_duration(&self) -> Duration {
        match self {
            Self::Simple => Duration::from_secs(30),
            Self::Medium => Duration::from_secs(120),
            Self::Complex => Duration::from_secs(300),
        }
    }
}

/// Per-execution charge applied after a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub work_units: f64,
    pub cost: f64,
}

/// Public description of a registered agent (`GET /agents`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub name: String,
    pub description: String,
    pub category: String,
    /// Free-form description of the expected input shape.
    pub inputs: JsonValue,
    pub outputs: JsonValue,
    pub cost_estimate: CostEstimate,
    pub complexity: ComplexityTier,
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
            inputs: JsonValue::Null,
            outputs: JsonValue::Null,
            cost_estimate: CostEstimate::default(),
            complexity: ComplexityTier::Simple,
        }
    }

    pub fn with_io(mut self, inputs: JsonValue, outputs: JsonValue) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    pub fn with_cost(mut self, work_units: f64, cost: f64) -> Self {
        self.cost_estimate = CostEstimate { work_units, cost };
        self
    }

    pub fn with_complexity(mut self, complexity: ComplexityTier) -> Self {
        self.complexity = complexity;
        self
    }
}
