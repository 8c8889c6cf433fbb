use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use agentflow_auth::{JwtClaims, QuotaLimits, Role};
use agentflow_core::{OrganizationId, UserId};
use agentflow_infra::Settings;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

const JWT_SECRET: &str = "test-secret";
const ADMIN_KEY: &str = "af_bootstrapadminkeyfortests000000";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(true).await
    }

    async fn spawn_with(worker_enabled: bool) -> Self {
        let settings = Settings {
            jwt_secret: JWT_SECRET.to_string(),
            worker_enabled,
            worker_wait_time: Duration::from_millis(200),
            bootstrap_admin_key: Some(ADMIN_KEY.to_string()),
            ..Settings::default()
        };

        // Same wiring as prod (in-memory backends), on an ephemeral port.
        let app = agentflow_api::app::build_app(&settings)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let router = app.router;
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(org_id: OrganizationId, roles: Vec<Role>, quota: Option<QuotaLimits>) -> String {
    let mut claims = JwtClaims::new(UserId::new(), org_id, Utc::now(), ChronoDuration::minutes(10))
        .with_roles(roles);
    claims.quota = quota;

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn member_token() -> String {
    mint_jwt(OrganizationId::new(), vec![Role::member()], None)
}

async fn submit(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    body: serde_json::Value,
) -> reqwest::Response {
    client
        .post(srv.url("/jobs"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn wait_for_terminal(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    job_id: &str,
) -> serde_json::Value {
    for _ in 0..200 {
        let res = client
            .get(srv.url(&format!("/jobs/{job_id}")))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = res.json().await.unwrap();
        if body["status"] == "completed" || body["status"] == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("job {job_id} did not finish within timeout");
}

#[tokio::test]
async fn probes_are_public() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/ready")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn credentials_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/agents")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "authentication_error");

    let res = client
        .get(srv.url("/agents"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/agents"))
        .header("X-API-Key", "af_doesnotexist")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn echo_job_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = member_token();

    let res = submit(&client, &srv, &token, json!({ "taskName": "Echo", "input": { "msg": "hi" } })).await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let handle: serde_json::Value = res.json().await.unwrap();
    assert_eq!(handle["status"], "queued");
    assert_eq!(handle["taskName"], "Echo");
    assert_eq!(handle["estimatedDuration"], 30);
    assert!(handle["createdAt"].is_string());
    let job_id = handle["jobId"].as_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&job_id).is_ok());

    let done = wait_for_terminal(&client, &srv, &token, &job_id).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["progress"], 100);
    assert_eq!(done["result"]["msg"], "hi");
    assert!(done.get("error").is_none());

    let res = client
        .get(srv.url(&format!("/jobs/{job_id}/result")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["result"]["msg"], "hi");
}

#[tokio::test]
async fn result_endpoint_reports_processing_until_terminal() {
    let srv = TestServer::spawn_with(false).await;
    let client = reqwest::Client::new();
    let token = member_token();

    let res = submit(&client, &srv, &token, json!({ "taskName": "Echo", "input": {} })).await;
    let job_id = res.json::<serde_json::Value>().await.unwrap()["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .get(srv.url(&format!("/jobs/{job_id}/result")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["processing"], true);
    assert_eq!(body["status"], "queued");
}

#[tokio::test]
async fn bad_submissions_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = member_token();

    let res = submit(&client, &srv, &token, json!({ "taskName": "NoSuchAgent", "input": {} })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unknown_task");

    let res = submit(&client, &srv, &token, json!({ "input": {} })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn missing_permission_is_forbidden() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let viewer = mint_jwt(OrganizationId::new(), vec![Role::viewer()], None);

    let res = submit(&client, &srv, &viewer, json!({ "taskName": "Echo", "input": {} })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "authorization_error");

    let res = client
        .get(srv.url("/keys"))
        .bearer_auth(&viewer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn jobs_are_invisible_across_organizations() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let owner = member_token();
    let stranger = member_token();

    let res = submit(&client, &srv, &owner, json!({ "taskName": "Echo", "input": {} })).await;
    let job_id = res.json::<serde_json::Value>().await.unwrap()["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    for (token, path) in [
        (&stranger, format!("/jobs/{job_id}")),
        (&owner, "/jobs/not-a-job".to_string()),
        (&owner, format!("/jobs/{}", uuid::Uuid::now_v7())),
    ] {
        let res = client.get(srv.url(&path)).bearer_auth(token).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn lists_agents_with_cost_estimates() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/agents"))
        .bearer_auth(member_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let agents: Vec<serde_json::Value> = res.json().await.unwrap();
    let echo = agents.iter().find(|a| a["name"] == "Echo").expect("Echo registered");
    assert!(echo["costEstimate"].is_object());
    assert!(echo["description"].is_string());
}

#[tokio::test]
async fn quota_exceeded_returns_429_with_usage() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let limits = QuotaLimits {
        requests_per_hour: 2,
        ..QuotaLimits::default()
    };
    let token = mint_jwt(OrganizationId::new(), vec![Role::member()], Some(limits));

    for _ in 0..2 {
        let res = submit(&client, &srv, &token, json!({ "taskName": "Echo", "input": {} })).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }
    let res = submit(&client, &srv, &token, json!({ "taskName": "Echo", "input": {} })).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "quota_exceeded");
    assert_eq!(body["usage"]["usage"]["hourly"]["requests"], 3.0);

    let res = client
        .get(srv.url("/quotas"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["limits"]["requestsPerHour"], 2);
    assert_eq!(report["usage"]["hourly"]["requests"], 2.0);
}

#[tokio::test]
async fn api_key_lifecycle_create_use_revoke() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/keys"))
        .header("X-API-Key", ADMIN_KEY)
        .json(&json!({ "name": "ci", "roles": ["member"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let key = created["key"].as_str().unwrap().to_string();
    let key_id = created["id"].as_str().unwrap().to_string();
    assert!(key.starts_with("af_"));
    assert!(key.starts_with(created["prefix"].as_str().unwrap()));

    // The new key works.
    let res = client
        .post(srv.url("/jobs"))
        .header("X-API-Key", &key)
        .json(&json!({ "taskName": "Echo", "input": { "via": "key" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    // Listing never exposes the secret.
    let res = client
        .get(srv.url("/keys"))
        .header("X-API-Key", ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let keys: Vec<serde_json::Value> = res.json().await.unwrap();
    assert!(keys.iter().any(|k| k["id"] == key_id.as_str()));
    assert!(keys.iter().all(|k| k.get("key").is_none()));

    let res = client
        .delete(srv.url(&format!("/keys/{key_id}")))
        .header("X-API-Key", ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // Revoked keys fail closed.
    let res = client
        .get(srv.url("/agents"))
        .header("X-API-Key", &key)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .delete(srv.url("/keys/not-an-id"))
        .header("X-API-Key", ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
