use serde::{Deserialize, Serialize};

/// Matches any resource or any action.
pub const WILDCARD: &str = "*";

/// Resources the orchestrator guards.
pub mod resources {
    pub const ORCHESTRATOR: &str = "orchestrator";
    pub const AGENTS: &str = "agents";
    pub const KEYS: &str = "keys";
    pub const QUOTAS: &str = "quotas";
}

/// Actions checked against those resources.
pub mod actions {
    pub const CREATE_JOB: &str = "create_job";
    pub const READ_JOB: &str = "read_job";
    pub const LIST: &str = "list";
    pub const MANAGE_KEYS: &str = "manage_keys";
    pub const READ: &str = "read";
}

/// An explicit permission grant: one resource, a list of actions.
///
/// Either side may be the wildcard `"*"`. There is no deny form; absence of a
/// matching grant is denial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub resource: String,
    pub actions: Vec<String>,
}

impl PermissionGrant {
    pub fn new<A, S>(resource: impl Into<String>, actions: A) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource: resource.into(),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    /// Grant covering every action on every resource.
    pub fn all() -> Self {
        Self::new(WILDCARD, [WILDCARD])
    }

    pub fn allows(&self, resource: &str, action: &str) -> bool {
        (self.resource == resource || self.resource == WILDCARD)
            && self.actions.iter().any(|a| a == action || a == WILDCARD)
    }

    pub fn has_wildcard(&self) -> bool {
        self.resource == WILDCARD || self.actions.iter().any(|a| a == WILDCARD)
    }
}

impl core::fmt::Display for PermissionGrant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.resource, self.actions.join(","))
    }
}
