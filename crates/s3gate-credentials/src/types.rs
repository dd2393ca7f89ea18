//! Credential data types shared across providers.

use serde::{Deserialize, Serialize};

/// An access-key / secret-key pair.
///
/// Immutable once constructed. Two pairs exist per logical identity: the
/// emulated pair the client signs with and the backend pair the proxy signs
/// with.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    /// The access key ID.
    pub access_key: String,
    /// The secret access key.
    pub secret_key: String,
}

impl CredentialPair {
    /// Create a new pair.
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

// Secret material must never leak through Debug output or logs.
impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// The association between an emulated identity and its backend identity.
///
/// Looked up on every request by the emulated access key; the emulated
/// secret verifies the inbound signature and the backend pair signs the
/// forwarded request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMapping {
    /// The pair the client presents to the proxy.
    pub emulated: CredentialPair,
    /// The pair the proxy uses toward the storage backend.
    pub backend: CredentialPair,
}
