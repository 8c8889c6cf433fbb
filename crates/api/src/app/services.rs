//! Backend selection and service wiring.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use agentflow_agents::AgentRegistry;
use agentflow_auth::{
    hash_api_key, ApiKeyRecord, ApiKeyService, ApiKeyStore, ApiKeyStoreError, Hs256JwtValidator,
    IdentityResolver, InMemoryApiKeyStore, InMemoryUsageStore, PermissionGrant, QuotaLimits,
    QuotaService, Role, UsageStore, API_KEY_PREFIX,
};
use agentflow_core::{ApiKeyId, OrganizationId, UserId};
use agentflow_infra::{
    InMemoryContextStore, InMemoryJobQueue, JobContextStore, JobQueue, JobService, Settings, Worker,
};

/// Storage adapters behind the services.
#[derive(Clone)]
pub struct Backends {
    pub contexts: Arc<dyn JobContextStore>,
    pub queue: Arc<dyn JobQueue>,
    pub usage: Arc<dyn UsageStore>,
    pub keys: Arc<dyn ApiKeyStore>,
}

impl Backends {
    /// Single-process adapters; state dies with the process.
    pub fn in_memory() -> Self {
        Self {
            contexts: Arc::new(InMemoryContextStore::new()),
            queue: Arc::new(InMemoryJobQueue::new()),
            usage: Arc::new(InMemoryUsageStore::new()),
            keys: Arc::new(InMemoryApiKeyStore::new()),
        }
    }

    #[cfg(feature = "redis")]
    pub async fn redis(settings: &Settings, redis_url: &str) -> anyhow::Result<Self> {
        use agentflow_infra::api_key_store::RedisApiKeyStore;
        use agentflow_infra::context_store::redis::RedisContextStore;
        use agentflow_infra::queue::redis_streams::RedisStreamsQueue;
        use agentflow_infra::usage_store::RedisUsageStore;

        let contexts = RedisContextStore::connect(redis_url)
            .await
            .context("connecting job context store")?;
        let queue = RedisStreamsQueue::connect(
            redis_url,
            settings.queue_stream.clone(),
            settings.queue_group.clone(),
            settings.worker_name.clone(),
        )
        .await
        .context("connecting job queue")?;
        let usage = RedisUsageStore::connect(redis_url)
            .await
            .context("connecting usage store")?;
        let keys = RedisApiKeyStore::connect(redis_url)
            .await
            .context("connecting api key store")?;

        Ok(Self {
            contexts: Arc::new(contexts),
            queue: Arc::new(queue),
            usage: Arc::new(usage),
            keys: Arc::new(keys),
        })
    }
}

/// Redis when `REDIS_URL` is set and the `redis` feature is compiled in.
pub async fn connect_backends(settings: &Settings) -> anyhow::Result<Backends> {
    match settings.redis_url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => {
            info!(stream = %settings.queue_stream, group = %settings.queue_group, "using redis backends");
            Backends::redis(settings, url).await
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            warn!("REDIS_URL is set but the redis feature is not compiled in; using in-memory backends");
            Ok(Backends::in_memory())
        }
        None => {
            info!("using in-memory backends");
            Ok(Backends::in_memory())
        }
    }
}

/// Application services shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    pub jobs: JobService,
    pub keys: ApiKeyService,
}

/// Wire services and an (unspawned) worker over the same backends.
pub fn build_services(settings: &Settings, backends: Backends, registry: AgentRegistry) -> (AppServices, Worker) {
    let jwt = Arc::new(Hs256JwtValidator::new(settings.jwt_secret.as_bytes()));
    let resolver = IdentityResolver::new(backends.keys.clone(), jwt);
    let quota = QuotaService::new(backends.usage.clone());

    let jobs = JobService::new(
        resolver.clone(),
        quota.clone(),
        registry.clone(),
        backends.contexts.clone(),
        backends.queue.clone(),
        settings.context_ttl,
    );
    let keys = ApiKeyService::new(backends.keys.clone(), resolver);
    let worker = Worker::new(
        backends.queue,
        backends.contexts,
        registry,
        quota,
        settings.worker_config(),
    );

    (AppServices { jobs, keys }, worker)
}

/// Store `plaintext` as an admin key of the system organization, so a fresh
/// deployment can mint its first real keys.
pub async fn seed_bootstrap_admin(store: &dyn ApiKeyStore, plaintext: &str) -> anyhow::Result<()> {
    if !plaintext.starts_with(API_KEY_PREFIX) {
        anyhow::bail!("BOOTSTRAP_ADMIN_KEY must start with {API_KEY_PREFIX}");
    }

    let display_prefix: String = plaintext.chars().take(API_KEY_PREFIX.len() + 6).collect();
    let record = ApiKeyRecord {
        id: ApiKeyId::new(),
        name: "bootstrap-admin".to_string(),
        display_prefix: display_prefix.clone(),
        key_hash: hash_api_key(plaintext),
        user_id: UserId::from_uuid(Uuid::nil()),
        organization_id: OrganizationId::from_uuid(Uuid::nil()),
        project_id: None,
        roles: vec![Role::admin()],
        grants: vec![PermissionGrant::all()],
        quota_limits: QuotaLimits::default(),
        created_at: Utc::now(),
        expires_at: None,
        revoked_at: None,
    };

    match store.insert(record).await {
        Ok(()) => {
            info!(prefix = %display_prefix, "bootstrap admin key seeded");
            Ok(())
        }
        Err(ApiKeyStoreError::Duplicate) => {
            info!("bootstrap admin key already present");
            Ok(())
        }
        Err(e) => Err(e).context("seeding bootstrap admin key"),
    }
}
