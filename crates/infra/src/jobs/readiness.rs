use crate::context_store::JobContextStore;
use crate::queue::JobQueue;

/// Probe the queue and the context store. `Err` names the first failure.
pub async fn check_readiness(queue: &dyn JobQueue, contexts: &dyn JobContextStore) -> Result<(), String> {
    queue
        .health_check()
        .await
        .map_err(|e| format!("queue: {e}"))?;
    contexts
        .health_check()
        .await
        .map_err(|e| format!("context store: {e}"))?;
    Ok(())
}
