//! Queue-polling worker.
//!
//! Per message: `received` → `executing` → `succeeded` (delete) or `failed`
//! → `requeued` (fresh enqueue with `retry_count + 1`, delete original) or
//! `dead` (terminal `failed` context, delete original).
//!
//! A message is only deleted once the context write for its outcome has
//! landed; otherwise it stays in flight and is redelivered after the
//! visibility timeout.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use agentflow_agents::{AgentContext, AgentError, AgentRegistry, ProgressReporter};
use agentflow_auth::{QuotaDimension, QuotaService};

use super::progress::ContextProgressSink;
use super::readiness::check_readiness;
use super::types::{JobContext, JobDescriptor};
use crate::context_store::{ContextStoreError, JobContextStore};
use crate::queue::{JobQueue, ReceivedMessage};

/// Progress written when an attempt starts.
const RUNNING_PROGRESS: u8 = 10;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name for logging (and the Redis consumer name)
    pub name: String,
    /// Maximum messages per receive
    pub batch_size: usize,
    pub visibility_timeout: Duration,
    /// Long-poll wait per receive
    pub wait_time: Duration,
    /// Retry ceiling; a job runs at most `max_retries + 1` times
    pub max_retries: u32,
    pub context_ttl: Duration,
    /// Sleep after an empty non-waiting poll, a receive error or a failed
    /// readiness probe
    pub idle_backoff: Duration,
    /// Fail `AgentError::Permanent`/`InvalidInput` immediately instead of
    /// retrying them
    pub dead_letter_permanent_errors: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "agentflow-worker".to_string(),
            batch_size: 10,
            visibility_timeout: Duration::from_secs(900),
            wait_time: Duration::from_secs(20),
            max_retries: 3,
            context_ttl: Duration::from_secs(86_400),
            idle_backoff: Duration::from_secs(1),
            dead_letter_permanent_errors: false,
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub skipped: u64,
    pub deferred: u64,
    pub in_flight: usize,
}

/// What happened to one delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Succeeded,
    Retried,
    DeadLettered,
    /// Redelivery of a job that already reached a terminal state.
    Skipped,
    /// The outcome could not be written; the message was left for redelivery.
    Deferred,
}

/// Handle to a spawned worker.
#[derive(Debug)]
pub struct WorkerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Stop polling and wait for the in-flight batch to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            error!(error = %e, "worker task ended abnormally");
        }
    }

    pub fn stats(&self) -> WorkerStats {
        lock(&self.stats).clone()
    }
}

#[derive(Clone)]
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    contexts: Arc<dyn JobContextStore>,
    registry: AgentRegistry,
    quota: QuotaService,
    config: WorkerConfig,
    stats: Arc<Mutex<WorkerStats>>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        contexts: Arc<dyn JobContextStore>,
        registry: AgentRegistry,
        quota: QuotaService,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            contexts,
            registry,
            quota,
            config,
            stats: Arc::new(Mutex::new(WorkerStats::default())),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn stats(&self) -> WorkerStats {
        lock(&self.stats).clone()
    }

    /// Run the loop on the current runtime until the returned handle is shut down.
    pub fn spawn(self) -> WorkerHandle {
        let token = CancellationToken::new();
        let stats = self.stats.clone();
        let child = token.clone();
        let join = tokio::spawn(async move { self.run(child).await });
        WorkerHandle { token, join, stats }
    }

    /// Poll until `shutdown` is cancelled.
    ///
    /// Every message of a batch runs concurrently; the next batch is not
    /// fetched until the whole current batch has finished.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(worker = %self.config.name, max_retries = self.config.max_retries, "worker started");

        while !shutdown.is_cancelled() {
            if let Err(reason) = check_readiness(self.queue.as_ref(), self.contexts.as_ref()).await {
                warn!(worker = %self.config.name, %reason, "dependencies not ready, skipping poll");
                self.backoff(&shutdown).await;
                continue;
            }

            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = self.queue.receive_batch(
                    self.config.batch_size,
                    self.config.visibility_timeout,
                    self.config.wait_time,
                ) => r,
            };

            match received {
                Ok(batch) if batch.is_empty() => {
                    if self.config.wait_time.is_zero() {
                        self.backoff(&shutdown).await;
                    }
                }
                Ok(batch) => self.process_batch(batch).await,
                Err(e) => {
                    error!(worker = %self.config.name, error = %e, "receive failed");
                    self.backoff(&shutdown).await;
                }
            }
        }

        info!(worker = %self.config.name, "worker stopped");
    }

    async fn backoff(&self, shutdown: &CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.config.idle_backoff) => {}
        }
    }

    async fn process_batch(&self, batch: Vec<ReceivedMessage>) {
        debug!(worker = %self.config.name, size = batch.len(), "processing batch");
        let mut tasks = JoinSet::new();
        for message in batch {
            let worker = self.clone();
            tasks.spawn(async move { worker.process_message(message).await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(worker = %self.config.name, error = %e, "message task panicked");
            }
        }
    }

    /// Drive one delivered message to its outcome.
    pub async fn process_message(&self, message: ReceivedMessage) -> MessageOutcome {
        let ReceivedMessage { descriptor, receipt } = message;
        let job_id = descriptor.job_id;
        self.update_stats(|s| s.in_flight += 1);

        let existing = self.contexts.get(job_id).await;
        if existing.as_ref().is_some_and(|c| c.status.is_terminal()) {
            info!(job_id = %job_id, "job already terminal, acknowledging redelivery");
            self.ack(&receipt).await;
            return self.finish(MessageOutcome::Skipped);
        }

        let mut context = existing.unwrap_or_else(|| JobContext::queued(&descriptor));

        if descriptor.retry_count > self.config.max_retries {
            let reason = format!("max retries ({}) exceeded", self.config.max_retries);
            if self.fail(&mut context, reason).await.is_err() {
                return self.finish(MessageOutcome::Deferred);
            }
            self.ack(&receipt).await;
            return self.finish(MessageOutcome::DeadLettered);
        }

        context.mark_running(Utc::now());
        // Progress only; the outcome write below decides whether we ack.
        let _ = self.save(&context).await;
        info!(
            job_id = %job_id,
            task_name = %descriptor.task_name,
            attempt = descriptor.retry_count,
            "job running"
        );

        match self.execute(&descriptor).await {
            Ok(result) => {
                context.mark_completed(result, Utc::now());
                if self.save(&context).await.is_err() {
                    return self.finish(MessageOutcome::Deferred);
                }
                self.charge(&descriptor).await;
                self.ack(&receipt).await;
                info!(job_id = %job_id, duration_ms = context.duration_ms, "job completed");
                self.finish(MessageOutcome::Succeeded)
            }
            Err(err) => {
                let permanent = self.config.dead_letter_permanent_errors && !err.is_retryable();
                if !permanent && descriptor.retry_count < self.config.max_retries {
                    context.mark_requeued(err.to_string(), Utc::now());
                    if self.save(&context).await.is_err() {
                        return self.finish(MessageOutcome::Deferred);
                    }
                    match self.queue.enqueue(&descriptor.next_attempt()).await {
                        Ok(()) => self.ack(&receipt).await,
                        // Original stays unacked and is redelivered after the visibility timeout.
                        Err(e) => warn!(job_id = %job_id, error = %e, "re-enqueue failed"),
                    }
                    warn!(
                        job_id = %job_id,
                        attempt = descriptor.retry_count,
                        error = %err,
                        "job failed, retry queued"
                    );
                    return self.finish(MessageOutcome::Retried);
                }

                let reason = if permanent {
                    err.to_string()
                } else {
                    format!("max retries ({}) exceeded: {err}", self.config.max_retries)
                };
                if self.fail(&mut context, reason).await.is_err() {
                    return self.finish(MessageOutcome::Deferred);
                }
                self.ack(&receipt).await;
                self.finish(MessageOutcome::DeadLettered)
            }
        }
    }

    async fn execute(&self, descriptor: &JobDescriptor) -> Result<serde_json::Value, AgentError> {
        let agent = self
            .registry
            .get(&descriptor.task_name)
            .ok_or_else(|| AgentError::permanent(format!("unknown task: {}", descriptor.task_name)))?;

        let sink = Arc::new(ContextProgressSink::new(self.contexts.clone(), self.config.context_ttl));
        let progress = ProgressReporter::new(descriptor.job_id, RUNNING_PROGRESS, sink);
        let ctx = AgentContext::new(descriptor.job_id, descriptor.retry_count, progress);
        agent.execute(descriptor.input.clone(), &ctx).await
    }

    async fn charge(&self, descriptor: &JobDescriptor) {
        let Some(agent) = self.registry.descriptor(&descriptor.task_name) else {
            return;
        };
        let user_id = descriptor.owner.user_id;
        let estimate = agent.cost_estimate;
        self.quota
            .record_usage(user_id, QuotaDimension::WorkUnits, estimate.work_units)
            .await;
        self.quota
            .record_usage(user_id, QuotaDimension::Cost, estimate.cost)
            .await;
    }

    async fn fail(&self, context: &mut JobContext, reason: String) -> Result<(), ContextStoreError> {
        error!(job_id = %context.job_id, error = %reason, "job dead-lettered");
        context.mark_failed(reason, Utc::now());
        self.save(context).await
    }

    async fn save(&self, context: &JobContext) -> Result<(), ContextStoreError> {
        self.contexts
            .put(context, self.config.context_ttl)
            .await
            .inspect_err(|e| {
                warn!(job_id = %context.job_id, status = %context.status, error = %e, "failed to write job context");
            })
    }

    async fn ack(&self, receipt: &crate::queue::Receipt) {
        if let Err(e) = self.queue.delete(receipt).await {
            warn!(receipt = %receipt, error = %e, "failed to delete message");
        }
    }

    fn finish(&self, outcome: MessageOutcome) -> MessageOutcome {
        self.update_stats(|s| {
            s.in_flight = s.in_flight.saturating_sub(1);
            s.processed += 1;
            match outcome {
                MessageOutcome::Succeeded => s.succeeded += 1,
                MessageOutcome::Retried => s.retried += 1,
                MessageOutcome::DeadLettered => s.dead_lettered += 1,
                MessageOutcome::Skipped => s.skipped += 1,
                MessageOutcome::Deferred => s.deferred += 1,
            }
        });
        outcome
    }

    fn update_stats(&self, f: impl FnOnce(&mut WorkerStats)) {
        f(&mut lock(&self.stats));
    }
}

fn lock(stats: &Mutex<WorkerStats>) -> std::sync::MutexGuard<'_, WorkerStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}
