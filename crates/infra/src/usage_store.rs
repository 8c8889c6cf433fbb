//! Redis-backed usage counters: one hash per bucket
//! (`agentflow:usage:<user>:<hour|day>:<bucket>`) with `requests`,
//! `work_units` and `cost` fields, incremented with `HINCRBYFLOAT`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::instrument;

use agentflow_auth::{QuotaDimension, UsageCounters, UsageKey, UsageStore, UsageStoreError};

const KEY_PREFIX: &str = "agentflow:usage";

#[derive(Clone)]
pub struct RedisUsageStore {
    conn: ConnectionManager,
}

impl core::fmt::Debug for RedisUsageStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisUsageStore").finish_non_exhaustive()
    }
}

fn unavailable(e: redis::RedisError) -> UsageStoreError {
    UsageStoreError::Unavailable(e.to_string())
}

impl RedisUsageStore {
    pub async fn connect(redis_url: &str) -> Result<Self, UsageStoreError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(key: &UsageKey) -> String {
        format!("{KEY_PREFIX}:{}", key.storage_key())
    }
}

#[async_trait]
impl UsageStore for RedisUsageStore {
    async fn read(&self, key: &UsageKey) -> Result<UsageCounters, UsageStoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, f64> = redis::cmd("HGETALL")
            .arg(Self::key(key))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        let field = |name: &str| fields.get(name).copied().unwrap_or(0.0);
        Ok(UsageCounters {
            requests: field(QuotaDimension::Requests.as_str()),
            work_units: field(QuotaDimension::WorkUnits.as_str()),
            cost: field(QuotaDimension::Cost.as_str()),
        })
    }

    #[instrument(skip(self, key), fields(key = %key.storage_key(), dimension = dimension.as_str()), err)]
    async fn increment(
        &self,
        key: &UsageKey,
        dimension: QuotaDimension,
        amount: f64,
        ttl: Duration,
    ) -> Result<(), UsageStoreError> {
        let redis_key = Self::key(key);
        let mut conn = self.conn.clone();
        let _: (f64, bool) = redis::pipe()
            .atomic()
            .cmd("HINCRBYFLOAT")
            .arg(&redis_key)
            .arg(dimension.as_str())
            .arg(amount)
            .cmd("EXPIRE")
            .arg(&redis_key)
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
