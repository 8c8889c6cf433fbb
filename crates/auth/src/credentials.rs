use serde::{Deserialize, Serialize};

/// A raw credential as presented by a caller.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Bearer(String),
}

impl Credential {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::ApiKey(_) => CredentialKind::ApiKey,
            Self::Bearer(_) => CredentialKind::BearerToken,
        }
    }

    pub fn secret(&self) -> &str {
        match self {
            Self::ApiKey(s) | Self::Bearer(s) => s,
        }
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("Credential::ApiKey(<redacted>)"),
            Self::Bearer(_) => f.write_str("Credential::Bearer(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    ApiKey,
    BearerToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let cred = Credential::ApiKey("af_supersecret".into());
        let printed = format!("{cred:?}");
        assert!(!printed.contains("supersecret"));
        assert_eq!(cred.kind(), CredentialKind::ApiKey);
    }
}
