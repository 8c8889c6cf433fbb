use std::collections::HashMap;
use std::sync::Arc;

use crate::{Agent, AgentDescriptor};

/// Name → agent lookup, populated once at startup.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in agents.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::EchoAgent);
        registry.register(crate::TextStatsAgent);
        registry
    }

    /// Register under the agent's descriptor name, replacing any previous
    /// agent with that name.
    pub fn register<A: Agent>(&mut self, agent: A) -> &mut Self {
        self.register_arc(Arc::new(agent))
    }

    pub fn register_arc(&mut self, agent: Arc<dyn Agent>) -> &mut Self {
        let name = agent.descriptor().name;
        if self.agents.insert(name.clone(), agent).is_some() {
            tracing::warn!(agent = %name, "agent registered twice; keeping the latest");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<AgentDescriptor> {
        self.agents.get(name).map(|a| a.descriptor())
    }

    /// All descriptors, sorted by name.
    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        let mut out: Vec<AgentDescriptor> = self.agents.values().map(|a| a.descriptor()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl core::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<&String> = self.agents.keys().collect();
        names.sort();
        f.debug_struct("AgentRegistry").field("agents", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered_and_sorted() {
        let registry = AgentRegistry::with_builtins();
        assert!(registry.contains("Echo"));
        assert!(!registry.contains("echo"));
        let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["Echo".to_string(), "TextStats".to_string()]);
    }

    #[test]
    fn re_registering_replaces() {
        let mut registry = AgentRegistry::new();
        registry.register(crate::EchoAgent).register(crate::EchoAgent);
        assert_eq!(registry.len(), 1);
    }
}
