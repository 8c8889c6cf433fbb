use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use agentflow_auth::Credential;

use crate::app::errors::json_error;
use crate::context::RequestCredential;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Require a credential header and hand it to the handlers.
///
/// Only presence is checked here; validity is decided when the services
/// resolve the identity.
pub async fn credential_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(credential) = extract_credential(req.headers()) else {
        return json_error(
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            "missing credentials: send X-API-Key or Authorization: Bearer",
        );
    };

    req.extensions_mut().insert(RequestCredential::new(credential));
    next.run(req).await
}

/// `X-API-Key` wins over `Authorization: Bearer` when both are sent.
pub fn extract_credential(headers: &HeaderMap) -> Option<Credential> {
    if let Some(key) = header_value(headers, API_KEY_HEADER) {
        return Some(Credential::ApiKey(key.to_string()));
    }

    let header = header_value(headers, axum::http::header::AUTHORIZATION.as_str())?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(Credential::Bearer(token.to_string()))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
