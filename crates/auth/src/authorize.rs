use thiserror::Error;

use agentflow_core::OrchestratorError;

use crate::CallerIdentity;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{resource}:{action}'")]
    Forbidden { resource: String, action: String },
}

impl From<AuthzError> for OrchestratorError {
    fn from(err: AuthzError) -> Self {
        OrchestratorError::forbidden(err.to_string())
    }
}

/// Decide whether `identity` may perform `action` on `resource`.
///
/// Admins pass unconditionally. Otherwise role-implied and explicit grants are
/// scanned; a grant matches on exact names or the `"*"` wildcard.
///
/// - No IO
/// - No panics
pub fn check_permission(identity: &CallerIdentity, resource: &str, action: &str) -> bool {
    if identity.is_admin() {
        return true;
    }
    identity
        .effective_grants()
        .iter()
        .any(|grant| grant.allows(resource, action))
}

/// `check_permission` as a `Result`, for use with `?` at gateway boundaries.
pub fn authorize(identity: &CallerIdentity, resource: &str, action: &str) -> Result<(), AuthzError> {
    if check_permission(identity, resource, action) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            resource: resource.to_string(),
            action: action.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actions, resources, CredentialKind, PermissionGrant, QuotaLimits, Role};
    use agentflow_core::{OrganizationId, UserId};

    fn identity(roles: Vec<Role>, grants: Vec<PermissionGrant>) -> CallerIdentity {
        CallerIdentity {
            user_id: UserId::new(),
            organization_id: OrganizationId::new(),
            project_id: None,
            roles,
            grants,
            quota_limits: QuotaLimits::default(),
            credential_kind: CredentialKind::ApiKey,
        }
    }

    #[test]
    fn admin_passes_everything() {
        let id = identity(vec![Role::admin()], vec![]);
        assert!(check_permission(&id, "orchestrator", "create_job"));
        assert!(check_permission(&id, "made_up", "whatever"));
    }

    #[test]
    fn no_grants_means_denied() {
        let id = identity(vec![], vec![]);
        assert!(!check_permission(&id, resources::ORCHESTRATOR, actions::READ_JOB));
        let err = authorize(&id, resources::ORCHESTRATOR, actions::CREATE_JOB).unwrap_err();
        assert_eq!(
            err.to_string(),
            "forbidden: missing permission 'orchestrator:create_job'"
        );
    }

    #[test]
    fn viewer_can_read_but_not_create() {
        let id = identity(vec![Role::viewer()], vec![]);
        assert!(check_permission(&id, resources::ORCHESTRATOR, actions::READ_JOB));
        assert!(!check_permission(&id, resources::ORCHESTRATOR, actions::CREATE_JOB));
        assert!(!check_permission(&id, resources::KEYS, actions::MANAGE_KEYS));
    }

    #[test]
    fn explicit_grant_adds_to_role() {
        let id = identity(
            vec![Role::viewer()],
            vec![PermissionGrant::new(resources::KEYS, [actions::MANAGE_KEYS])],
        );
        assert!(check_permission(&id, resources::KEYS, actions::MANAGE_KEYS));
    }

    #[test]
    fn unknown_role_grants_nothing() {
        let id = identity(vec![Role::new("auditor")], vec![]);
        assert!(!check_permission(&id, resources::AGENTS, actions::LIST));
    }

    #[test]
    fn authz_error_maps_to_authorization() {
        let err: OrchestratorError = AuthzError::Forbidden {
            resource: "keys".into(),
            action: "manage_keys".into(),
        }
        .into();
        assert_eq!(err.code(), "authorization_error");
    }
}
