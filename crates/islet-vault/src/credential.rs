//! Credential types.
//!
//! Secret material lives only in the trusted domain. The wrapper type
//! zeroizes on drop and never renders its contents through `Debug` or
//! `Display`.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// What kind of credential this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// A static API key.
    ApiKey,
    /// An OAuth access token.
    OauthToken,
    /// Username/password pair, pre-encoded.
    BasicAuth,
    /// Anything else.
    Custom,
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey => write!(f, "api_key"),
            Self::OauthToken => write!(f, "oauth_token"),
            Self::BasicAuth => write!(f, "basic_auth"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// Secret material. Zeroized on drop; opaque in debug output.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap secret material.
    #[must_use]
    pub fn new(material: impl Into<String>) -> Self {
        Self(material.into())
    }

    /// Expose the material. Only the trusted domain calls this.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// One stored credential for an MCP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// The MCP this credential belongs to.
    pub mcp_name: String,
    /// What kind of credential it is.
    pub kind: CredentialKind,
    /// The secret material itself.
    pub secret: Secret,
}

impl Credential {
    /// Create a credential.
    #[must_use]
    pub fn new(
        mcp_name: impl Into<String>,
        kind: CredentialKind,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            mcp_name: mcp_name.into(),
            kind,
            secret: Secret::new(secret),
        }
    }
}

/// Listing entry: everything about a credential except the secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialInfo {
    /// The MCP this credential belongs to.
    pub mcp_name: String,
    /// What kind of credential it is.
    pub kind: CredentialKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_opaque() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
    }

    #[test]
    fn test_credential_roundtrip() {
        let cred = Credential::new("github", CredentialKind::OauthToken, "gho_abc");
        let json = serde_json::to_string(&cred).unwrap();
        // The secret serializes transparently for the encrypted blob
        assert!(json.contains("gho_abc"));
        let back: Credential = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cred);
    }
}
