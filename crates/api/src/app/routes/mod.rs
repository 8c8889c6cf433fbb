use axum::{
    routing::{delete, get, post},
    Router,
};

pub mod agents;
pub mod jobs;
pub mod keys;
pub mod quotas;
pub mod system;

/// Router for all endpoints that require a credential.
pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(jobs::submit_job))
        .route("/jobs/:job_id", get(jobs::get_job))
        .route("/jobs/:job_id/result", get(jobs::get_job_result))
        .route("/agents", get(agents::list_agents))
        .route("/keys", post(keys::create_key).get(keys::list_keys))
        .route("/keys/:key_id", delete(keys::revoke_key))
        .route("/quotas", get(quotas::get_quotas))
}
