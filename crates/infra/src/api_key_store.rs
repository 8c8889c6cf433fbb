//! Redis-backed API key store.
//!
//! - `agentflow:apikey:<sha256>` → JSON `ApiKeyRecord`
//! - `agentflow:apikey-id:<key_id>` → sha256 of that key
//! - `agentflow:apikeys:<org_id>` → set of sha256 digests in the organization

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use tracing::instrument;

use agentflow_auth::{ApiKeyRecord, ApiKeyStore, ApiKeyStoreError};
use agentflow_core::{ApiKeyId, OrganizationId};

#[derive(Clone)]
pub struct RedisApiKeyStore {
    conn: ConnectionManager,
}

impl core::fmt::Debug for RedisApiKeyStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisApiKeyStore").finish_non_exhaustive()
    }
}

fn unavailable(e: redis::RedisError) -> ApiKeyStoreError {
    ApiKeyStoreError::Unavailable(e.to_string())
}

fn record_key(hash: &str) -> String {
    format!("agentflow:apikey:{hash}")
}

fn id_key(id: ApiKeyId) -> String {
    format!("agentflow:apikey-id:{id}")
}

fn org_key(org: OrganizationId) -> String {
    format!("agentflow:apikeys:{org}")
}

fn decode(raw: &str) -> Result<ApiKeyRecord, ApiKeyStoreError> {
    serde_json::from_str(raw).map_err(|e| ApiKeyStoreError::Corrupt(e.to_string()))
}

fn encode(record: &ApiKeyRecord) -> Result<String, ApiKeyStoreError> {
    serde_json::to_string(record).map_err(|e| ApiKeyStoreError::Corrupt(e.to_string()))
}

impl RedisApiKeyStore {
    pub async fn connect(redis_url: &str) -> Result<Self, ApiKeyStoreError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ApiKeyStore for RedisApiKeyStore {
    #[instrument(skip(self, record), fields(key_id = %record.id, org_id = %record.organization_id), err)]
    async fn insert(&self, record: ApiKeyRecord) -> Result<(), ApiKeyStoreError> {
        let json = encode(&record)?;
        let mut conn = self.conn.clone();

        let created: Option<String> = redis::cmd("SET")
            .arg(record_key(&record.key_hash))
            .arg(&json)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        if created.is_none() {
            return Err(ApiKeyStoreError::Duplicate);
        }

        let _: () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(id_key(record.id))
            .arg(&record.key_hash)
            .cmd("SADD")
            .arg(org_key(record.organization_id))
            .arg(&record.key_hash)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, ApiKeyStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(record_key(key_hash))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        raw.as_deref().map(decode).transpose()
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ApiKeyRecord>, ApiKeyStoreError> {
        let mut conn = self.conn.clone();
        let hashes: Vec<String> = redis::cmd("SMEMBERS")
            .arg(org_key(organization_id))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = hashes.iter().map(|h| record_key(h)).collect();
        let raws: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        let mut records = raws
            .iter()
            .flatten()
            .map(|raw| decode(raw))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    #[instrument(skip(self), err)]
    async fn revoke(
        &self,
        organization_id: OrganizationId,
        key_id: ApiKeyId,
        at: DateTime<Utc>,
    ) -> Result<bool, ApiKeyStoreError> {
        let mut conn = self.conn.clone();
        let hash: Option<String> = redis::cmd("GET")
            .arg(id_key(key_id))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        let Some(hash) = hash else {
            return Ok(false);
        };

        let Some(mut record) = self.find_by_hash(&hash).await? else {
            return Ok(false);
        };
        if record.organization_id != organization_id {
            return Ok(false);
        }
        record.revoked_at.get_or_insert(at);

        let _: () = redis::cmd("SET")
            .arg(record_key(&hash))
            .arg(encode(&record)?)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(true)
    }
}
