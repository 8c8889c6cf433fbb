//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: backend selection (in-memory or Redis) and service wiring
//! - `routes/`: HTTP handlers, one file per resource
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: error → status mapping and JSON error bodies

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use agentflow_agents::AgentRegistry;
use agentflow_infra::{Settings, WorkerHandle};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::{AppServices, Backends};

/// Router plus the worker running next to it, if enabled.
pub struct App {
    pub router: Router,
    pub worker: Option<WorkerHandle>,
}

/// Build the full application from settings (public entrypoint used by `main.rs`).
pub async fn build_app(settings: &Settings) -> anyhow::Result<App> {
    let backends = services::connect_backends(settings).await?;
    build_app_with(settings, backends, AgentRegistry::with_builtins()).await
}

/// Same as `build_app` over caller-supplied backends and agents.
pub async fn build_app_with(
    settings: &Settings,
    backends: Backends,
    registry: AgentRegistry,
) -> anyhow::Result<App> {
    if let Some(key) = settings.bootstrap_admin_key.as_deref() {
        services::seed_bootstrap_admin(backends.keys.as_ref(), key).await?;
    }

    let (services, worker) = services::build_services(settings, backends, registry);
    let worker = settings.worker_enabled.then(|| worker.spawn());

    Ok(App {
        router: router(Arc::new(services)),
        worker,
    })
}

/// Public probes plus the credential-protected API.
pub fn router(services: Arc<AppServices>) -> Router {
    let protected = routes::router().layer(axum::middleware::from_fn(middleware::credential_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/ready", get(routes::system::ready))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
