use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::permissions::{actions, resources, PermissionGrant};

/// Role identifier used for RBAC.
///
/// Roles are opaque strings; the three well-known ones below carry implicit
/// grants, anything else only contributes what is granted explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Passes every permission check unconditionally.
    pub const ADMIN: &'static str = "admin";
    pub const MEMBER: &'static str = "member";
    pub const VIEWER: &'static str = "viewer";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn admin() -> Self {
        Self::new(Self::ADMIN)
    }

    pub fn member() -> Self {
        Self::new(Self::MEMBER)
    }

    pub fn viewer() -> Self {
        Self::new(Self::VIEWER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.as_str() == Self::ADMIN
    }

    /// Grants implied by holding this role.
    pub fn implied_grants(&self) -> Vec<PermissionGrant> {
        match self.as_str() {
            Self::MEMBER => vec![
                PermissionGrant::new(
                    resources::ORCHESTRATOR,
                    [actions::CREATE_JOB, actions::READ_JOB],
                ),
                PermissionGrant::new(resources::AGENTS, [actions::LIST]),
                PermissionGrant::new(resources::QUOTAS, [actions::READ]),
            ],
            Self::VIEWER => vec![
                PermissionGrant::new(resources::ORCHESTRATOR, [actions::READ_JOB]),
                PermissionGrant::new(resources::AGENTS, [actions::LIST]),
            ],
            _ => Vec::new(),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
