use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use agentflow_core::{ApiKeyId, OrchestratorError, OrchestratorResult};

use crate::api_keys::{generate_api_key, ApiKeyRecord, ApiKeyStore, ApiKeyStoreError, ApiKeySummary};
use crate::{
    actions, authorize, check_permission, resources, CallerIdentity, Credential, IdentityResolver,
    PermissionGrant, Role,
};

/// Request to mint a new key for the calling user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKey {
    pub name: String,
    /// Defaults to the caller's roles.
    #[serde(default)]
    pub roles: Option<Vec<Role>>,
    /// Defaults to the caller's explicit grants.
    #[serde(default)]
    pub permissions: Option<Vec<PermissionGrant>>,
    #[serde(default)]
    pub expires_in_secs: Option<i64>,
}

/// Result of `create_key`: the only time the plaintext is ever returned.
#[derive(Clone)]
pub struct IssuedApiKey {
    pub key: String,
    pub summary: ApiKeySummary,
}

impl core::fmt::Debug for IssuedApiKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IssuedApiKey")
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

/// API key lifecycle, scoped to the caller's organization.
#[derive(Clone)]
pub struct ApiKeyService {
    store: Arc<dyn ApiKeyStore>,
    resolver: IdentityResolver,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn ApiKeyStore>, resolver: IdentityResolver) -> Self {
        Self { store, resolver }
    }

    pub async fn create_key(&self, credential: &Credential, request: CreateApiKey) -> OrchestratorResult<IssuedApiKey> {
        let caller = self.manager(credential).await?;

        let name = request.name.trim();
        if name.is_empty() || name.len() > 100 {
            return Err(OrchestratorError::validation("name must be 1-100 characters"));
        }
        let expires_at = match request.expires_in_secs {
            Some(secs) if secs <= 0 => {
                return Err(OrchestratorError::validation("expiresInSecs must be positive"));
            }
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                    .ok_or_else(|| OrchestratorError::validation("expiresInSecs out of range"))?,
            ),
            None => None,
        };

        let roles = request.roles.unwrap_or_else(|| caller.roles.clone());
        let grants = request.permissions.unwrap_or_else(|| caller.grants.clone());
        ensure_no_escalation(&caller, &roles, &grants)?;

        let generated = generate_api_key();
        let record = ApiKeyRecord {
            id: ApiKeyId::new(),
            name: name.to_string(),
            display_prefix: generated.display_prefix.clone(),
            key_hash: generated.hash.clone(),
            user_id: caller.user_id,
            organization_id: caller.organization_id,
            project_id: caller.project_id,
            roles,
            grants,
            quota_limits: caller.quota_limits,
            created_at: Utc::now(),
            expires_at,
            revoked_at: None,
        };
        let summary = record.summary();
        self.store.insert(record).await.map_err(store_err)?;

        info!(key_id = %summary.id, org_id = %caller.organization_id, "api key created");
        Ok(IssuedApiKey {
            key: generated.plaintext,
            summary,
        })
    }

    pub async fn list_keys(&self, credential: &Credential) -> OrchestratorResult<Vec<ApiKeySummary>> {
        let caller = self.manager(credential).await?;
        let records = self
            .store
            .list_for_organization(caller.organization_id)
            .await
            .map_err(store_err)?;
        Ok(records.iter().map(ApiKeyRecord::summary).collect())
    }

    pub async fn revoke_key(&self, credential: &Credential, key_id: ApiKeyId) -> OrchestratorResult<()> {
        let caller = self.manager(credential).await?;
        let found = self
            .store
            .revoke(caller.organization_id, key_id, Utc::now())
            .await
            .map_err(store_err)?;
        if !found {
            return Err(OrchestratorError::not_found());
        }
        info!(key_id = %key_id, org_id = %caller.organization_id, "api key revoked");
        Ok(())
    }

    async fn manager(&self, credential: &Credential) -> OrchestratorResult<CallerIdentity> {
        let caller = self.resolver.resolve(credential).await?;
        authorize(&caller, resources::KEYS, actions::MANAGE_KEYS)?;
        Ok(caller)
    }
}

/// Users cannot mint keys more privileged than themselves.
fn ensure_no_escalation(caller: &CallerIdentity, roles: &[Role], grants: &[PermissionGrant]) -> OrchestratorResult<()> {
    if caller.is_admin() {
        return Ok(());
    }
    if let Some(role) = roles.iter().find(|r| !caller.roles.contains(r)) {
        return Err(OrchestratorError::forbidden(format!("cannot grant role '{role}'")));
    }
    for grant in grants {
        if grant.has_wildcard() {
            return Err(OrchestratorError::forbidden("only admins can grant wildcard permissions"));
        }
        if let Some(action) = grant
            .actions
            .iter()
            .find(|a| !check_permission(caller, &grant.resource, a))
        {
            return Err(OrchestratorError::forbidden(format!(
                "cannot grant permission '{}:{action}'",
                grant.resource
            )));
        }
    }
    Ok(())
}

fn store_err(err: ApiKeyStoreError) -> OrchestratorError {
    warn!(error = %err, "api key store failure");
    OrchestratorError::transient(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Hs256JwtValidator, InMemoryApiKeyStore, JwtClaims};
    use agentflow_core::{OrganizationId, UserId};

    const SECRET: &[u8] = b"key-service-secret";

    fn service() -> ApiKeyService {
        let store: Arc<dyn ApiKeyStore> = Arc::new(InMemoryApiKeyStore::new());
        let resolver = IdentityResolver::new(store.clone(), Arc::new(Hs256JwtValidator::new(SECRET)));
        ApiKeyService::new(store, resolver)
    }

    fn bearer(org: OrganizationId, roles: Vec<Role>, grants: Vec<PermissionGrant>) -> Credential {
        let claims = JwtClaims::new(UserId::new(), org, Utc::now(), Duration::hours(1))
            .with_roles(roles)
            .with_permissions(grants);
        Credential::Bearer(Hs256JwtValidator::new(SECRET).issue(&claims).unwrap())
    }

    fn named(name: &str) -> CreateApiKey {
        CreateApiKey {
            name: name.into(),
            ..CreateApiKey::default()
        }
    }

    #[tokio::test]
    async fn created_key_authenticates_and_is_listed() {
        let svc = service();
        let org = OrganizationId::new();
        let admin = bearer(org, vec![Role::admin()], vec![]);

        let issued = svc.create_key(&admin, named("ci")).await.unwrap();
        assert!(issued.key.starts_with("af_"));

        let id = svc.resolver.resolve(&Credential::ApiKey(issued.key.clone())).await.unwrap();
        assert_eq!(id.organization_id, org);
        assert!(id.is_admin());

        let listed = svc.list_keys(&admin).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, issued.summary.id);
    }

    #[tokio::test]
    async fn revoked_key_stops_resolving() {
        let svc = service();
        let admin = bearer(OrganizationId::new(), vec![Role::admin()], vec![]);
        let issued = svc.create_key(&admin, named("temp")).await.unwrap();

        svc.revoke_key(&admin, issued.summary.id).await.unwrap();
        assert!(svc.resolver.resolve(&Credential::ApiKey(issued.key)).await.is_err());
        assert!(svc.list_keys(&admin).await.unwrap()[0].revoked);
    }

    #[tokio::test]
    async fn keys_are_scoped_to_organization() {
        let svc = service();
        let admin_a = bearer(OrganizationId::new(), vec![Role::admin()], vec![]);
        let admin_b = bearer(OrganizationId::new(), vec![Role::admin()], vec![]);
        let issued = svc.create_key(&admin_a, named("a")).await.unwrap();

        assert!(svc.list_keys(&admin_b).await.unwrap().is_empty());
        assert_eq!(
            svc.revoke_key(&admin_b, issued.summary.id).await,
            Err(OrchestratorError::NotFound)
        );
    }

    #[tokio::test]
    async fn members_without_manage_keys_are_forbidden() {
        let svc = service();
        let member = bearer(OrganizationId::new(), vec![Role::member()], vec![]);
        let err = svc.create_key(&member, named("x")).await.unwrap_err();
        assert_eq!(err.code(), "authorization_error");
    }

    #[tokio::test]
    async fn key_managers_cannot_escalate() {
        let svc = service();
        let manager = bearer(
            OrganizationId::new(),
            vec![Role::member()],
            vec![PermissionGrant::new(resources::KEYS, [actions::MANAGE_KEYS])],
        );

        let mut admin_role = named("escalate");
        admin_role.roles = Some(vec![Role::admin()]);
        assert!(svc.create_key(&manager, admin_role).await.is_err());

        let mut wildcard = named("wild");
        wildcard.permissions = Some(vec![PermissionGrant::all()]);
        assert!(svc.create_key(&manager, wildcard).await.is_err());

        let mut narrower = named("narrow");
        narrower.roles = Some(vec![Role::member()]);
        narrower.permissions = Some(vec![]);
        assert!(svc.create_key(&manager, narrower).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let svc = service();
        let admin = bearer(OrganizationId::new(), vec![Role::admin()], vec![]);
        assert!(matches!(
            svc.create_key(&admin, named("  ")).await,
            Err(OrchestratorError::Validation(_))
        ));

        let mut negative = named("neg");
        negative.expires_in_secs = Some(-5);
        assert!(matches!(
            svc.create_key(&admin, negative).await,
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn rejects_expiry_beyond_representable_time() {
        let svc = service();
        let admin = bearer(OrganizationId::new(), vec![Role::admin()], vec![]);
        for secs in [i64::MAX, i64::MAX / 1000, 400_000 * 365 * 86_400] {
            let mut far = named("far");
            far.expires_in_secs = Some(secs);
            assert_eq!(
                svc.create_key(&admin, far).await.unwrap_err(),
                OrchestratorError::validation("expiresInSecs out of range")
            );
        }

        let mut year = named("year");
        year.expires_in_secs = Some(365 * 86_400);
        let issued = svc.create_key(&admin, year).await.unwrap();
        assert!(issued.summary.expires_at.is_some());
    }

    #[tokio::test]
    async fn missing_credential_secret_is_authentication_error() {
        let svc = service();
        let err = svc.list_keys(&Credential::ApiKey("af_nope".into())).await.unwrap_err();
        assert_eq!(err, OrchestratorError::Authentication);
    }
}
