use agentflow_auth::{Credential, CredentialKind};

/// Credential presented on a request, inserted by the credential middleware.
///
/// Resolution to an identity happens in the services, not here, so every
/// route fails the same way for a bad key or a bad token.
#[derive(Debug, Clone)]
pub struct RequestCredential {
    credential: Credential,
}

impl RequestCredential {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn kind(&self) -> CredentialKind {
        self.credential.kind()
    }
}
