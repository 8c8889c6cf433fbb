//! `agentflow-auth` — caller identity, permissions and usage quotas.
//!
//! This crate is decoupled from HTTP and from concrete storage: API keys and
//! usage counters are reached through the `ApiKeyStore` / `UsageStore` ports,
//! with in-memory implementations here and Redis ones in `agentflow-infra`.

pub mod api_keys;
pub mod authorize;
pub mod claims;
pub mod credentials;
pub mod identity;
pub mod jwt;
pub mod key_service;
pub mod permissions;
pub mod quota;
pub mod resolver;
pub mod roles;

pub use api_keys::{
    generate_api_key, hash_api_key, ApiKeyRecord, ApiKeyStore, ApiKeyStoreError, ApiKeySummary,
    GeneratedKey, InMemoryApiKeyStore, API_KEY_PREFIX,
};
pub use authorize::{authorize, check_permission, AuthzError};
pub use claims::{validate_claims, JwtClaims, TokenValidationError};
pub use credentials::{Credential, CredentialKind};
pub use identity::CallerIdentity;
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use key_service::{ApiKeyService, CreateApiKey, IssuedApiKey};
pub use permissions::{actions, resources, PermissionGrant, WILDCARD};
pub use quota::{
    InMemoryUsageStore, QuotaDecision, QuotaDimension, QuotaLimits, QuotaReport, QuotaService,
    UsageCounters, UsageKey, UsageSnapshot, UsageStore, UsageStoreError, UsageWindow,
};
pub use resolver::{AuthenticationError, IdentityResolver};
pub use roles::Role;
