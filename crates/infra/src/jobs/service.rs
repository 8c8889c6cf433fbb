//! Submission and status/result gateways.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{info, instrument, warn};

use agentflow_agents::{AgentDescriptor, AgentRegistry};
use agentflow_auth::{
    actions, authorize, resources, CallerIdentity, Credential, IdentityResolver, QuotaDimension,
    QuotaReport, QuotaService,
};
use agentflow_core::{JobId, OrchestratorError, OrchestratorResult};

use super::readiness::check_readiness;
use super::types::{JobContext, JobDescriptor, JobHandle, JobOwner, JobStatus};
use crate::context_store::JobContextStore;
use crate::queue::JobQueue;

const MAX_TASK_NAME_LEN: usize = 128;
const MAX_METADATA_KEYS: usize = 64;
const MAX_INPUT_BYTES: usize = 1024 * 1024;

/// A submission request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJob {
    pub task_name: String,
    #[serde(default)]
    pub input: JsonValue,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub metadata: Option<Map<String, JsonValue>>,
}

impl SubmitJob {
    pub fn new(task_name: impl Into<String>, input: JsonValue) -> Self {
        Self {
            task_name: task_name.into(),
            input,
            priority: None,
            metadata: None,
        }
    }

    fn validate(&self) -> OrchestratorResult<()> {
        let name = self.task_name.trim();
        if name.is_empty() {
            return Err(OrchestratorError::validation("taskName is required"));
        }
        if name.len() > MAX_TASK_NAME_LEN {
            return Err(OrchestratorError::validation(format!(
                "taskName exceeds {MAX_TASK_NAME_LEN} characters"
            )));
        }
        if self.metadata.as_ref().is_some_and(|m| m.len() > MAX_METADATA_KEYS) {
            return Err(OrchestratorError::validation(format!(
                "metadata exceeds {MAX_METADATA_KEYS} keys"
            )));
        }
        let input_bytes = serde_json::to_vec(&self.input)
            .map_err(|e| OrchestratorError::validation(format!("input is not serialisable: {e}")))?
            .len();
        if input_bytes > MAX_INPUT_BYTES {
            return Err(OrchestratorError::validation("input exceeds 1 MiB"));
        }
        Ok(())
    }
}

/// Gateway over identity, quota, registry, context store and queue.
///
/// Every operation takes the raw credential and resolves it itself.
#[derive(Clone)]
pub struct JobService {
    resolver: IdentityResolver,
    quota: QuotaService,
    registry: AgentRegistry,
    contexts: Arc<dyn JobContextStore>,
    queue: Arc<dyn JobQueue>,
    context_ttl: Duration,
}

impl JobService {
    pub fn new(
        resolver: IdentityResolver,
        quota: QuotaService,
        registry: AgentRegistry,
        contexts: Arc<dyn JobContextStore>,
        queue: Arc<dyn JobQueue>,
        context_ttl: Duration,
    ) -> Self {
        Self {
            resolver,
            quota,
            registry,
            contexts,
            queue,
            context_ttl,
        }
    }

    /// Accept a job and return immediately; never waits on execution.
    #[instrument(skip(self, credential, request), fields(task_name = %request.task_name), err)]
    pub async fn submit(&self, credential: &Credential, request: SubmitJob) -> OrchestratorResult<JobHandle> {
        let identity = self.resolver.resolve(credential).await?;
        authorize(&identity, resources::ORCHESTRATOR, actions::CREATE_JOB)?;
        request.validate()?;

        let decision = self
            .quota
            .check_quota(&identity, QuotaDimension::Requests, 1.0)
            .await;
        if !decision.allowed {
            return Err(OrchestratorError::QuotaExceeded {
                usage: serde_json::to_value(&decision).unwrap_or_default(),
            });
        }

        let task_name = request.task_name.trim().to_string();
        let agent = self
            .registry
            .descriptor(&task_name)
            .ok_or_else(|| OrchestratorError::unknown_task(&task_name))?;

        let job_id = JobId::new();
        let descriptor = JobDescriptor::new(job_id, task_name, request.input, JobOwner::from(&identity))
            .with_priority(request.priority.unwrap_or(0))
            .with_metadata(request.metadata.unwrap_or_default());

        let mut context = JobContext::queued(&descriptor);
        self.contexts
            .put(&context, self.context_ttl)
            .await
            .map_err(|e| OrchestratorError::transient(e.to_string()))?;

        if let Err(e) = self.queue.enqueue(&descriptor).await {
            warn!(job_id = %job_id, error = %e, "enqueue failed after context write");
            context.mark_failed(format!("enqueue failed: {e}"), Utc::now());
            if let Err(put_err) = self.contexts.put(&context, self.context_ttl).await {
                warn!(job_id = %job_id, error = %put_err, "failed to mark unqueued job as failed");
            }
            return Err(OrchestratorError::transient(e.to_string()));
        }

        info!(job_id = %job_id, task_name = %descriptor.task_name, user_id = %identity.user_id, "job queued");
        Ok(JobHandle {
            job_id,
            task_name: descriptor.task_name,
            status: JobStatus::Queued,
            estimated_duration: agent.complexity.estimated_duration(),
            created_at: descriptor.submitted_at,
        })
    }

    /// Current context of a job visible to the caller.
    ///
    /// Unknown, expired, malformed and other-organization ids are all
    /// `NotFound`.
    pub async fn get_status(&self, credential: &Credential, job_id: &str) -> OrchestratorResult<JobContext> {
        let identity = self.resolver.resolve(credential).await?;
        authorize(&identity, resources::ORCHESTRATOR, actions::READ_JOB)?;

        let job_id: JobId = job_id.parse().map_err(|_| OrchestratorError::not_found())?;
        let context = self
            .contexts
            .get(job_id)
            .await
            .ok_or_else(OrchestratorError::not_found)?;

        if !can_see(&identity, &context) {
            return Err(OrchestratorError::not_found());
        }
        Ok(context)
    }

    /// Same lookup as `get_status`; callers check `status.is_terminal()`.
    pub async fn get_result(&self, credential: &Credential, job_id: &str) -> OrchestratorResult<JobContext> {
        self.get_status(credential, job_id).await
    }

    pub async fn list_agents(&self, credential: &Credential) -> OrchestratorResult<Vec<AgentDescriptor>> {
        let identity = self.resolver.resolve(credential).await?;
        authorize(&identity, resources::AGENTS, actions::LIST)?;
        Ok(self.registry.descriptors())
    }

    pub async fn quota_report(&self, credential: &Credential) -> OrchestratorResult<QuotaReport> {
        let identity = self.resolver.resolve(credential).await?;
        authorize(&identity, resources::QUOTAS, actions::READ)?;
        self.quota
            .current_usage(&identity)
            .await
            .map_err(|e| OrchestratorError::transient(e.to_string()))
    }

    pub async fn readiness(&self) -> OrchestratorResult<()> {
        check_readiness(self.queue.as_ref(), self.contexts.as_ref())
            .await
            .map_err(OrchestratorError::transient)
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }
}

fn can_see(identity: &CallerIdentity, context: &JobContext) -> bool {
    identity.is_admin() || context.owner.organization_id == identity.organization_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context_store::InMemoryContextStore;
    use crate::queue::InMemoryJobQueue;
    use agentflow_auth::{
        ApiKeyStore, Hs256JwtValidator, InMemoryApiKeyStore, InMemoryUsageStore, JwtClaims,
        PermissionGrant, Role,
    };
    use agentflow_core::{OrganizationId, UserId};
    use serde_json::json;

    const SECRET: &[u8] = b"service-secret";

    struct Fixture {
        service: JobService,
        queue: Arc<InMemoryJobQueue>,
        contexts: Arc<InMemoryContextStore>,
    }

    fn fixture() -> Fixture {
        let keys: Arc<dyn ApiKeyStore> = Arc::new(InMemoryApiKeyStore::new());
        let resolver = IdentityResolver::new(keys, Arc::new(Hs256JwtValidator::new(SECRET)));
        let queue = Arc::new(InMemoryJobQueue::new());
        let contexts = Arc::new(InMemoryContextStore::new());
        let service = JobService::new(
            resolver,
            QuotaService::new(Arc::new(InMemoryUsageStore::new())),
            AgentRegistry::with_builtins(),
            contexts.clone(),
            queue.clone(),
            Duration::from_secs(3600),
        );
        Fixture {
            service,
            queue,
            contexts,
        }
    }

    fn token(org: OrganizationId, roles: Vec<Role>, grants: Vec<PermissionGrant>) -> Credential {
        let claims = JwtClaims::new(UserId::new(), org, Utc::now(), chrono::Duration::hours(1))
            .with_roles(roles)
            .with_permissions(grants);
        Credential::Bearer(Hs256JwtValidator::new(SECRET).issue(&claims).unwrap())
    }

    fn member(org: OrganizationId) -> Credential {
        token(org, vec![Role::member()], vec![])
    }

    #[tokio::test]
    async fn submit_writes_context_and_enqueues() {
        let f = fixture();
        let cred = member(OrganizationId::new());

        let handle = f
            .service
            .submit(&cred, SubmitJob::new("Echo", json!({"msg": "hi"})))
            .await
            .unwrap();
        assert_eq!(handle.status, JobStatus::Queued);
        assert_eq!(handle.estimated_duration, Duration::from_secs(30));

        let ctx = f.contexts.get(handle.job_id).await.unwrap();
        assert_eq!((ctx.status, ctx.progress), (JobStatus::Queued, 0));
        assert_eq!(f.queue.approximate_depth().await.unwrap(), 1);

        let status = f.service.get_status(&cred, &handle.job_id.to_string()).await.unwrap();
        assert_eq!(status.job_id, handle.job_id);
    }

    #[tokio::test]
    async fn unknown_task_is_rejected_without_side_effects() {
        let f = fixture();
        let err = f
            .service
            .submit(&member(OrganizationId::new()), SubmitJob::new("Nope", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, OrchestratorError::UnknownTask("Nope".into()));
        assert_eq!(f.queue.approximate_depth().await.unwrap(), 0);
        assert!(f.contexts.is_empty());
    }

    #[tokio::test]
    async fn blank_task_name_is_validation_error() {
        let f = fixture();
        let err = f
            .service
            .submit(&member(OrganizationId::new()), SubmitJob::new("  ", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
    }

    #[tokio::test]
    async fn bad_credential_is_authentication_error() {
        let f = fixture();
        let err = f
            .service
            .submit(&Credential::Bearer("nope".into()), SubmitJob::new("Echo", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, OrchestratorError::Authentication);
    }

    #[tokio::test]
    async fn other_organizations_jobs_are_not_found() {
        let f = fixture();
        let owner = member(OrganizationId::new());
        let stranger = member(OrganizationId::new());
        let handle = f.service.submit(&owner, SubmitJob::new("Echo", json!({}))).await.unwrap();

        let err = f
            .service
            .get_status(&stranger, &handle.job_id.to_string())
            .await
            .unwrap_err();
        assert_eq!(err, OrchestratorError::NotFound);

        let admin = token(OrganizationId::new(), vec![Role::admin()], vec![]);
        assert!(f.service.get_status(&admin, &handle.job_id.to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_and_unknown_ids_are_not_found() {
        let f = fixture();
        let cred = member(OrganizationId::new());
        for id in ["not-a-uuid".to_string(), JobId::new().to_string()] {
            assert_eq!(
                f.service.get_status(&cred, &id).await.unwrap_err(),
                OrchestratorError::NotFound
            );
        }
    }

    #[tokio::test]
    async fn permission_checks_precede_lookup() {
        let f = fixture();
        let nobody = token(OrganizationId::new(), vec![], vec![]);
        let err = f.service.get_status(&nobody, "not-a-uuid").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Authorization(_)));
        assert!(matches!(
            f.service.list_agents(&nobody).await,
            Err(OrchestratorError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn lists_agents_and_reports_quota() {
        let f = fixture();
        let cred = member(OrganizationId::new());
        let agents = f.service.list_agents(&cred).await.unwrap();
        assert!(agents.iter().any(|a| a.name == "Echo"));

        f.service.submit(&cred, SubmitJob::new("Echo", json!({}))).await.unwrap();
        let report = f.service.quota_report(&cred).await.unwrap();
        assert_eq!(report.usage.hourly.requests, 1.0);
        assert_eq!(report.usage.daily.requests, 1.0);
    }

    #[tokio::test]
    async fn readiness_is_ok_on_in_memory_adapters() {
        assert!(fixture().service.readiness().await.is_ok());
    }
}
