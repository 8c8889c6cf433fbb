//! Environment-driven settings.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::jobs::WorkerConfig;

const DEV_JWT_SECRET: &str = "agentflow-dev-secret-change-me";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Process settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub redis_url: Option<String>,
    pub queue_stream: String,
    pub queue_group: String,
    pub context_ttl: Duration,
    pub worker_name: String,
    pub worker_enabled: bool,
    pub worker_batch_size: usize,
    pub worker_visibility_timeout: Duration,
    pub worker_wait_time: Duration,
    pub worker_max_retries: u32,
    /// Plaintext `af_` key seeded as an admin key at startup.
    pub bootstrap_admin_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            redis_url: None,
            queue_stream: "agentflow:jobs".to_string(),
            queue_group: "agentflow-workers".to_string(),
            context_ttl: Duration::from_secs(86_400),
            worker_name: format!("agentflow-{}", std::process::id()),
            worker_enabled: true,
            worker_batch_size: 10,
            worker_visibility_timeout: Duration::from_secs(900),
            worker_wait_time: Duration::from_secs(20),
            worker_max_retries: 3,
            bootstrap_admin_key: None,
        }
    }
}

impl Settings {
    /// Read from the process environment, honouring a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using the development secret");
                defaults.jwt_secret.clone()
            }
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            jwt_secret,
            redis_url: get("REDIS_URL"),
            queue_stream: get("QUEUE_STREAM").unwrap_or(defaults.queue_stream),
            queue_group: get("QUEUE_GROUP").unwrap_or(defaults.queue_group),
            context_ttl: secs(&get, "JOB_CONTEXT_TTL_SECS", defaults.context_ttl)?,
            worker_name: get("WORKER_NAME").unwrap_or(defaults.worker_name),
            worker_enabled: flag(&get, "WORKER_ENABLED", defaults.worker_enabled)?,
            worker_batch_size: parsed(&get, "WORKER_BATCH_SIZE", defaults.worker_batch_size)?,
            worker_visibility_timeout: secs(
                &get,
                "WORKER_VISIBILITY_TIMEOUT_SECS",
                defaults.worker_visibility_timeout,
            )?,
            worker_wait_time: secs(&get, "WORKER_WAIT_TIME_SECS", defaults.worker_wait_time)?,
            worker_max_retries: parsed(&get, "WORKER_MAX_RETRIES", defaults.worker_max_retries)?,
            bootstrap_admin_key: get("BOOTSTRAP_ADMIN_KEY"),
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            name: self.worker_name.clone(),
            batch_size: self.worker_batch_size,
            visibility_timeout: self.worker_visibility_timeout,
            wait_time: self.worker_wait_time,
            max_retries: self.worker_max_retries,
            context_ttl: self.context_ttl,
            ..WorkerConfig::default()
        }
    }
}

fn parsed<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn secs<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parsed(get, key, default.as_secs()).map(Duration::from_secs)
}

fn flag<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value: raw }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = from(&[]).unwrap();
        assert_eq!(s.bind_addr, "0.0.0.0:8080");
        assert_eq!(s.queue_stream, "agentflow:jobs");
        assert_eq!(s.context_ttl, Duration::from_secs(86_400));
        assert_eq!(s.worker_max_retries, 3);
        assert!(s.worker_enabled);
        assert!(s.redis_url.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let s = from(&[
            ("WORKER_BATCH_SIZE", "4"),
            ("WORKER_WAIT_TIME_SECS", "0"),
            ("WORKER_ENABLED", "false"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("JWT_SECRET", "s3cret"),
        ])
        .unwrap();
        assert_eq!(s.worker_batch_size, 4);
        assert_eq!(s.worker_wait_time, Duration::ZERO);
        assert!(!s.worker_enabled);
        assert_eq!(s.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(s.worker_config().batch_size, 4);
    }

    #[test]
    fn invalid_numbers_fail() {
        let err = from(&[("WORKER_MAX_RETRIES", "three")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "WORKER_MAX_RETRIES",
                value: "three".into()
            }
        );
        assert!(from(&[("WORKER_ENABLED", "maybe")]).is_err());
    }
}
