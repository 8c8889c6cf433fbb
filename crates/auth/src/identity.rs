use serde::Serialize;

use agentflow_core::{OrganizationId, ProjectId, UserId};

use crate::{CredentialKind, PermissionGrant, QuotaLimits, Role};

/// A resolved caller, produced only by `IdentityResolver`.
///
/// Every downstream decision (permission checks, quota accounting, job
/// ownership) is made against this value, never against the raw credential.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub project_id: Option<ProjectId>,
    pub roles: Vec<Role>,
    pub grants: Vec<PermissionGrant>,
    pub quota_limits: QuotaLimits,
    pub credential_kind: CredentialKind,
}

impl CallerIdentity {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == name)
    }

    /// Role-implied grants followed by explicit ones.
    pub fn effective_grants(&self) -> Vec<PermissionGrant> {
        self.roles
            .iter()
            .flat_map(Role::implied_grants)
            .chain(self.grants.iter().cloned())
            .collect()
    }
}
