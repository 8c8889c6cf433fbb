//! Rolling usage counters and quota enforcement.
//!
//! Usage is tracked per user in hourly and daily buckets keyed by the bucket's
//! start (`2026-10-17T14` / `2026-10-17`). Buckets are never deleted; they
//! decay through store expiry.
//!
//! ## Check semantics
//!
//! `check_quota` reads both windows, adds the requested amount, and compares
//! the *attempted* totals against all five limits. Only an allowed request is
//! persisted. A rejected request leaves the stored counters untouched and
//! returns the attempted usage so the caller can see why.
//!
//! The read/check/commit sequence is not atomic across concurrent requests
//! from the same caller; a burst may overshoot a limit by a small margin.
//!
//! If the counter store is unreachable the check fails open.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use agentflow_core::UserId;

use crate::CallerIdentity;

/// What a quota check or usage record counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaDimension {
    Requests,
    WorkUnits,
    Cost,
}

impl QuotaDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::WorkUnits => "work_units",
            Self::Cost => "cost",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageWindow {
    Hour,
    Day,
}

impl UsageWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    /// Bucket label containing `now` (UTC calendar hour / day).
    pub fn bucket(&self, now: DateTime<Utc>) -> String {
        match self {
            Self::Hour => now.format("%Y-%m-%dT%H").to_string(),
            Self::Day => now.format("%Y-%m-%d").to_string(),
        }
    }

    /// How long a bucket is retained by the store after its last write.
    pub fn retention(&self) -> Duration {
        match self {
            Self::Hour => Duration::from_secs(2 * 60 * 60),
            Self::Day => Duration::from_secs(48 * 60 * 60),
        }
    }
}

/// Per-caller limits. All comparisons are inclusive: reaching a limit exactly
/// is allowed, exceeding it is not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaLimits {
    pub requests_per_hour: u64,
    pub requests_per_day: u64,
    pub work_units_per_hour: f64,
    pub work_units_per_day: f64,
    pub cost_per_day: f64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            requests_per_hour: 1_000,
            requests_per_day: 10_000,
            work_units_per_hour: 1_000.0,
            work_units_per_day: 10_000.0,
            cost_per_day: 100.0,
        }
    }
}

impl QuotaLimits {
    /// Names of every limit the given totals exceed.
    pub fn breaches(&self, hourly: &UsageCounters, daily: &UsageCounters) -> Vec<&'static str> {
        let mut out = Vec::new();
        if hourly.requests > self.requests_per_hour as f64 {
            out.push("requestsPerHour");
        }
        if daily.requests > self.requests_per_day as f64 {
            out.push("requestsPerDay");
        }
        if hourly.work_units > self.work_units_per_hour {
            out.push("workUnitsPerHour");
        }
        if daily.work_units > self.work_units_per_day {
            out.push("workUnitsPerDay");
        }
        if daily.cost > self.cost_per_day {
            out.push("costPerDay");
        }
        out
    }
}

/// Counter values for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    pub requests: f64,
    pub work_units: f64,
    pub cost: f64,
}

impl UsageCounters {
    pub fn get(&self, dimension: QuotaDimension) -> f64 {
        match dimension {
            QuotaDimension::Requests => self.requests,
            QuotaDimension::WorkUnits => self.work_units,
            QuotaDimension::Cost => self.cost,
        }
    }

    pub fn plus(mut self, dimension: QuotaDimension, amount: f64) -> Self {
        match dimension {
            QuotaDimension::Requests => self.requests += amount,
            QuotaDimension::WorkUnits => self.work_units += amount,
            QuotaDimension::Cost => self.cost += amount,
        }
        self
    }
}

/// Identifies one stored bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsageKey {
    pub user_id: UserId,
    pub window: UsageWindow,
    pub bucket: String,
}

impl UsageKey {
    pub fn at(user_id: UserId, window: UsageWindow, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            window,
            bucket: window.bucket(now),
        }
    }

    /// Flat key used by string-keyed stores.
    pub fn storage_key(&self) -> String {
        format!("{}:{}:{}", self.user_id, self.window.as_str(), self.bucket)
    }
}

/// Usage both windows would reach (or have reached).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub hour_bucket: String,
    pub day_bucket: String,
    pub hourly: UsageCounters,
    pub daily: UsageCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDecision {
    pub allowed: bool,
    pub usage: UsageSnapshot,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exceeded: Vec<&'static str>,
}

/// Current usage next to the caller's limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaReport {
    pub limits: QuotaLimits,
    pub usage: UsageSnapshot,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageStoreError {
    #[error("usage store unavailable: {0}")]
    Unavailable(String),
}

/// Counter storage port.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Missing buckets read as zero.
    async fn read(&self, key: &UsageKey) -> Result<UsageCounters, UsageStoreError>;

    /// Add `amount` to one dimension and refresh the bucket's expiry.
    async fn increment(
        &self,
        key: &UsageKey,
        dimension: QuotaDimension,
        amount: f64,
        ttl: Duration,
    ) -> Result<(), UsageStoreError>;
}

#[async_trait]
impl<T: UsageStore + ?Sized> UsageStore for Arc<T> {
    async fn read(&self, key: &UsageKey) -> Result<UsageCounters, UsageStoreError> {
        (**self).read(key).await
    }

    async fn increment(
        &self,
        key: &UsageKey,
        dimension: QuotaDimension,
        amount: f64,
        ttl: Duration,
    ) -> Result<(), UsageStoreError> {
        (**self).increment(key, dimension, amount, ttl).await
    }
}

/// Single-process usage store for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    buckets: Mutex<HashMap<UsageKey, (UsageCounters, Instant)>>,
}

fn poison_err<T>(_: PoisonError<T>) -> UsageStoreError {
    UsageStoreError::Unavailable("usage store lock poisoned".to_string())
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn read(&self, key: &UsageKey) -> Result<UsageCounters, UsageStoreError> {
        let buckets = self.buckets.lock().map_err(poison_err)?;
        Ok(buckets
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(counters, _)| *counters)
            .unwrap_or_default())
    }

    async fn increment(
        &self,
        key: &UsageKey,
        dimension: QuotaDimension,
        amount: f64,
        ttl: Duration,
    ) -> Result<(), UsageStoreError> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().map_err(poison_err)?;
        let entry = buckets
            .entry(key.clone())
            .or_insert((UsageCounters::default(), now + ttl));
        if entry.1 <= now {
            entry.0 = UsageCounters::default();
        }
        entry.0 = entry.0.plus(dimension, amount);
        entry.1 = now + ttl;
        Ok(())
    }
}

/// Enforces and records per-user usage.
#[derive(Clone)]
pub struct QuotaService {
    store: Arc<dyn UsageStore>,
}

impl QuotaService {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    pub async fn check_quota(
        &self,
        identity: &CallerIdentity,
        dimension: QuotaDimension,
        amount: f64,
    ) -> QuotaDecision {
        self.check_quota_at(identity, dimension, amount, Utc::now()).await
    }

    /// `check_quota` against an explicit clock.
    pub async fn check_quota_at(
        &self,
        identity: &CallerIdentity,
        dimension: QuotaDimension,
        amount: f64,
        now: DateTime<Utc>,
    ) -> QuotaDecision {
        let hour_key = UsageKey::at(identity.user_id, UsageWindow::Hour, now);
        let day_key = UsageKey::at(identity.user_id, UsageWindow::Day, now);

        let (hourly, daily) = match self.read_windows(&hour_key, &day_key).await {
            Ok(current) => current,
            Err(err) => {
                warn!(user_id = %identity.user_id, error = %err, "quota store unreachable; allowing request");
                return QuotaDecision {
                    allowed: true,
                    usage: snapshot(
                        &hour_key,
                        &day_key,
                        UsageCounters::default().plus(dimension, amount),
                        UsageCounters::default().plus(dimension, amount),
                    ),
                    exceeded: Vec::new(),
                };
            }
        };

        let attempted_hourly = hourly.plus(dimension, amount);
        let attempted_daily = daily.plus(dimension, amount);
        let usage = snapshot(&hour_key, &day_key, attempted_hourly, attempted_daily);

        let exceeded = identity
            .quota_limits
            .breaches(&attempted_hourly, &attempted_daily);
        if !exceeded.is_empty() {
            info!(
                user_id = %identity.user_id,
                dimension = dimension.as_str(),
                exceeded = ?exceeded,
                "quota exceeded"
            );
            return QuotaDecision {
                allowed: false,
                usage,
                exceeded,
            };
        }

        self.commit(&hour_key, &day_key, dimension, amount).await;
        QuotaDecision {
            allowed: true,
            usage,
            exceeded: Vec::new(),
        }
    }

    /// Add usage without a limit check (post-execution charging).
    pub async fn record_usage(&self, user_id: UserId, dimension: QuotaDimension, amount: f64) {
        self.record_usage_at(user_id, dimension, amount, Utc::now()).await
    }

    pub async fn record_usage_at(
        &self,
        user_id: UserId,
        dimension: QuotaDimension,
        amount: f64,
        now: DateTime<Utc>,
    ) {
        if amount <= 0.0 {
            return;
        }
        let hour_key = UsageKey::at(user_id, UsageWindow::Hour, now);
        let day_key = UsageKey::at(user_id, UsageWindow::Day, now);
        self.commit(&hour_key, &day_key, dimension, amount).await;
    }

    /// Current usage against the caller's limits.
    pub async fn current_usage(&self, identity: &CallerIdentity) -> Result<QuotaReport, UsageStoreError> {
        let now = Utc::now();
        let hour_key = UsageKey::at(identity.user_id, UsageWindow::Hour, now);
        let day_key = UsageKey::at(identity.user_id, UsageWindow::Day, now);
        let (hourly, daily) = self.read_windows(&hour_key, &day_key).await?;
        Ok(QuotaReport {
            limits: identity.quota_limits,
            usage: snapshot(&hour_key, &day_key, hourly, daily),
        })
    }

    async fn read_windows(
        &self,
        hour_key: &UsageKey,
        day_key: &UsageKey,
    ) -> Result<(UsageCounters, UsageCounters), UsageStoreError> {
        let hourly = self.store.read(hour_key).await?;
        let daily = self.store.read(day_key).await?;
        Ok((hourly, daily))
    }

    async fn commit(&self, hour_key: &UsageKey, day_key: &UsageKey, dimension: QuotaDimension, amount: f64) {
        for key in [hour_key, day_key] {
            if let Err(err) = self
                .store
                .increment(key, dimension, amount, key.window.retention())
                .await
            {
                warn!(key = %key.storage_key(), error = %err, "failed to persist usage increment");
            }
        }
    }
}

fn snapshot(hour_key: &UsageKey, day_key: &UsageKey, hourly: UsageCounters, daily: UsageCounters) -> UsageSnapshot {
    UsageSnapshot {
        hour_bucket: hour_key.bucket.clone(),
        day_bucket: day_key.bucket.clone(),
        hourly,
        daily,
    }
}
