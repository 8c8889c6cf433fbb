//! Persisted API keys.
//!
//! Plaintext keys look like `af_<32 alphanumerics>` and are shown exactly once,
//! at creation. Only the SHA-256 hex digest and a short display prefix are
//! stored.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use agentflow_core::{ApiKeyId, OrganizationId, ProjectId, UserId};

use crate::{CallerIdentity, CredentialKind, PermissionGrant, QuotaLimits, Role};

pub const API_KEY_PREFIX: &str = "af_";

const KEY_BODY_LEN: usize = 32;
const DISPLAY_PREFIX_LEN: usize = API_KEY_PREFIX.len() + 6;

/// A freshly generated key. `plaintext` must not be persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedKey {
    pub plaintext: String,
    pub display_prefix: String,
    pub hash: String,
}

impl core::fmt::Debug for GeneratedKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GeneratedKey")
            .field("display_prefix", &self.display_prefix)
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

pub fn generate_api_key() -> GeneratedKey {
    let charset: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                           abcdefghijklmnopqrstuvwxyz\
                           0123456789";
    let mut rng = rand::thread_rng();
    let body: String = (0..KEY_BODY_LEN)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect();
    let plaintext = format!("{API_KEY_PREFIX}{body}");

    GeneratedKey {
        display_prefix: plaintext[..DISPLAY_PREFIX_LEN].to_string(),
        hash: hash_api_key(&plaintext),
        plaintext,
    }
}

/// Lowercase hex SHA-256 of the full plaintext key.
pub fn hash_api_key(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stored form of an API key, carrying the identity it resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: ApiKeyId,
    pub name: String,
    pub display_prefix: String,
    pub key_hash: String,
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub project_id: Option<ProjectId>,
    pub roles: Vec<Role>,
    pub grants: Vec<PermissionGrant>,
    pub quota_limits: QuotaLimits,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|exp| now < exp)
    }

    pub fn to_identity(&self) -> CallerIdentity {
        CallerIdentity {
            user_id: self.user_id,
            organization_id: self.organization_id,
            project_id: self.project_id,
            roles: self.roles.clone(),
            grants: self.grants.clone(),
            quota_limits: self.quota_limits,
            credential_kind: CredentialKind::ApiKey,
        }
    }

    pub fn summary(&self) -> ApiKeySummary {
        ApiKeySummary {
            id: self.id,
            name: self.name.clone(),
            prefix: self.display_prefix.clone(),
            user_id: self.user_id,
            roles: self.roles.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            revoked: self.revoked_at.is_some(),
        }
    }
}

/// Listing view of a key; never contains the hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySummary {
    pub id: ApiKeyId,
    pub name: String,
    pub prefix: String,
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiKeyStoreError {
    #[error("api key store unavailable: {0}")]
    Unavailable(String),

    #[error("api key already exists")]
    Duplicate,

    #[error("corrupt api key record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn insert(&self, record: ApiKeyRecord) -> Result<(), ApiKeyStoreError>;

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, ApiKeyStoreError>;

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ApiKeyRecord>, ApiKeyStoreError>;

    /// Mark a key revoked. Returns `false` if no such key exists in the
    /// organization.
    async fn revoke(
        &self,
        organization_id: OrganizationId,
        key_id: ApiKeyId,
        at: DateTime<Utc>,
    ) -> Result<bool, ApiKeyStoreError>;
}

#[async_trait]
impl<T: ApiKeyStore + ?Sized> ApiKeyStore for Arc<T> {
    async fn insert(&self, record: ApiKeyRecord) -> Result<(), ApiKeyStoreError> {
        (**self).insert(record).await
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, ApiKeyStoreError> {
        (**self).find_by_hash(key_hash).await
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ApiKeyRecord>, ApiKeyStoreError> {
        (**self).list_for_organization(organization_id).await
    }

    async fn revoke(
        &self,
        organization_id: OrganizationId,
        key_id: ApiKeyId,
        at: DateTime<Utc>,
    ) -> Result<bool, ApiKeyStoreError> {
        (**self).revoke(organization_id, key_id, at).await
    }
}

/// Keys indexed by hash. Not shared across processes.
#[derive(Debug, Default)]
pub struct InMemoryApiKeyStore {
    by_hash: RwLock<HashMap<String, ApiKeyRecord>>,
}

fn poison_err<T>(_: PoisonError<T>) -> ApiKeyStoreError {
    ApiKeyStoreError::Unavailable("api key store lock poisoned".to_string())
}

impl InMemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyStore for InMemoryApiKeyStore {
    async fn insert(&self, record: ApiKeyRecord) -> Result<(), ApiKeyStoreError> {
        let mut keys = self.by_hash.write().map_err(poison_err)?;
        if keys.contains_key(&record.key_hash) {
            return Err(ApiKeyStoreError::Duplicate);
        }
        keys.insert(record.key_hash.clone(), record);
        Ok(())
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, ApiKeyStoreError> {
        let keys = self.by_hash.read().map_err(poison_err)?;
        Ok(keys.get(key_hash).cloned())
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ApiKeyRecord>, ApiKeyStoreError> {
        let keys = self.by_hash.read().map_err(poison_err)?;
        let mut out: Vec<ApiKeyRecord> = keys
            .values()
            .filter(|r| r.organization_id == organization_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn revoke(
        &self,
        organization_id: OrganizationId,
        key_id: ApiKeyId,
        at: DateTime<Utc>,
    ) -> Result<bool, ApiKeyStoreError> {
        let mut keys = self.by_hash.write().map_err(poison_err)?;
        match keys
            .values_mut()
            .find(|r| r.id == key_id && r.organization_id == organization_id)
        {
            Some(record) => {
                record.revoked_at.get_or_insert(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
