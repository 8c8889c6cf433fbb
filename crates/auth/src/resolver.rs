use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use agentflow_core::OrchestratorError;

use crate::api_keys::{hash_api_key, ApiKeyStore, API_KEY_PREFIX};
use crate::{CallerIdentity, Credential, CredentialKind, JwtValidator, QuotaLimits};

/// Resolution failure. Deliberately carries no reason: callers see one
/// uniform error whatever went wrong.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid credentials")]
pub struct AuthenticationError;

impl From<AuthenticationError> for OrchestratorError {
    fn from(_: AuthenticationError) -> Self {
        OrchestratorError::Authentication
    }
}

/// Turns a raw credential into a `CallerIdentity`, failing closed.
#[derive(Clone)]
pub struct IdentityResolver {
    keys: Arc<dyn ApiKeyStore>,
    jwt: Arc<dyn JwtValidator>,
    default_limits: QuotaLimits,
}

impl IdentityResolver {
    pub fn new(keys: Arc<dyn ApiKeyStore>, jwt: Arc<dyn JwtValidator>) -> Self {
        Self {
            keys,
            jwt,
            default_limits: QuotaLimits::default(),
        }
    }

    /// Limits applied to bearer tokens that carry no `quota` claim.
    pub fn with_default_limits(mut self, limits: QuotaLimits) -> Self {
        self.default_limits = limits;
        self
    }

    pub fn default_limits(&self) -> QuotaLimits {
        self.default_limits
    }

    pub async fn resolve(&self, credential: &Credential) -> Result<CallerIdentity, AuthenticationError> {
        self.resolve_at(credential, Utc::now()).await
    }

    pub async fn resolve_at(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<CallerIdentity, AuthenticationError> {
        match credential {
            Credential::ApiKey(key) => self.resolve_api_key(key, now).await,
            Credential::Bearer(token) => self.resolve_bearer(token, now),
        }
    }

    async fn resolve_api_key(&self, key: &str, now: DateTime<Utc>) -> Result<CallerIdentity, AuthenticationError> {
        if !key.starts_with(API_KEY_PREFIX) {
            debug!("api key rejected: wrong prefix");
            return Err(AuthenticationError);
        }

        let record = match self.keys.find_by_hash(&hash_api_key(key)).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("api key rejected: unknown key");
                return Err(AuthenticationError);
            }
            Err(err) => {
                warn!(error = %err, "api key lookup failed; rejecting credential");
                return Err(AuthenticationError);
            }
        };

        if !record.is_active(now) {
            debug!(key_id = %record.id, "api key rejected: expired or revoked");
            return Err(AuthenticationError);
        }
        Ok(record.to_identity())
    }

    fn resolve_bearer(&self, token: &str, now: DateTime<Utc>) -> Result<CallerIdentity, AuthenticationError> {
        let claims = self.jwt.validate(token, now).map_err(|err| {
            debug!(error = %err, "bearer token rejected");
            AuthenticationError
        })?;

        Ok(CallerIdentity {
            user_id: claims.sub,
            organization_id: claims.org_id,
            project_id: claims.project_id,
            roles: claims.roles,
            grants: claims.permissions,
            quota_limits: claims.quota.unwrap_or(self.default_limits),
            credential_kind: CredentialKind::BearerToken,
        })
    }
}
