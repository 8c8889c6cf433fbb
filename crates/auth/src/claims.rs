use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agentflow_core::{OrganizationId, ProjectId, UserId};

use crate::{PermissionGrant, QuotaLimits, Role};

/// Bearer token claims.
///
/// `iat` / `exp` are unix seconds, as in any standard JWT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    pub org_id: OrganizationId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,

    #[serde(default)]
    pub roles: Vec<Role>,

    /// Explicit grants on top of what the roles imply.
    #[serde(default)]
    pub permissions: Vec<PermissionGrant>,

    /// Overrides the deployment's default quota limits for this caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaLimits>,

    pub iat: i64,
    pub exp: i64,
}

impl JwtClaims {
    pub fn new(sub: UserId, org_id: OrganizationId, issued_at: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            sub,
            org_id,
            project_id: None,
            roles: Vec::new(),
            permissions: Vec::new(),
            quota: None,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn with_permissions(mut self, grants: impl IntoIterator<Item = PermissionGrant>) -> Self {
        self.permissions.extend(grants);
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("token signature mismatch")]
    BadSignature,

    #[error("malformed token: {0}")]
    Malformed(String),
}

/// Deterministically validate the time window of decoded claims.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims_at(iat: DateTime<Utc>, ttl: Duration) -> JwtClaims {
        JwtClaims::new(UserId::new(), OrganizationId::new(), iat, ttl)
    }

    #[test]
    fn accepts_within_window() {
        let now = Utc::now();
        let claims = claims_at(now - Duration::minutes(1), Duration::hours(1));
        assert_eq!(validate_claims(&claims, now), Ok(()));
    }

    #[test]
    fn rejects_expired_and_future_tokens() {
        let now = Utc::now();
        let expired = claims_at(now - Duration::hours(2), Duration::hours(1));
        assert_eq!(validate_claims(&expired, now), Err(TokenValidationError::Expired));

        let future = claims_at(now + Duration::minutes(5), Duration::hours(1));
        assert_eq!(validate_claims(&future, now), Err(TokenValidationError::NotYetValid));
    }

    #[test]
    fn rejects_inverted_window() {
        let now = Utc::now();
        let claims = claims_at(now, Duration::seconds(0));
        assert_eq!(
            validate_claims(&claims, now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let json = serde_json::json!({
            "sub": UserId::new(),
            "org_id": OrganizationId::new(),
            "iat": 1_700_000_000,
            "exp": 1_700_003_600,
        });
        let claims: JwtClaims = serde_json::from_value(json).unwrap();
        assert!(claims.roles.is_empty());
        assert!(claims.permissions.is_empty());
        assert!(claims.quota.is_none());
    }
}
