//! The credential provider trait and the in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ResolveError;
use crate::types::CredentialMapping;

/// Capability interface for resolving emulated access keys to credential
/// mappings.
///
/// The active variant is selected by explicit configuration at startup;
/// nothing inspects provider types at request time.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Resolve the mapping for the given emulated access key.
    ///
    /// # Errors
    ///
    /// [`ResolveError::NotFound`] for an unknown key, [`ResolveError::Backend`]
    /// when the lookup itself failed.
    async fn resolve(&self, access_key: &str) -> Result<CredentialMapping, ResolveError>;
}

/// Fixed in-memory mappings.
///
/// Suitable for tests and single-tenant deployments where one emulated pair
/// fronts one backend pair.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialsProvider {
    mappings: HashMap<String, CredentialMapping>,
}

impl StaticCredentialsProvider {
    /// Build a provider from an iterable of mappings, keyed by their
    /// emulated access key.
    pub fn new(mappings: impl IntoIterator<Item = CredentialMapping>) -> Self {
        Self {
            mappings: mappings
                .into_iter()
                .map(|m| (m.emulated.access_key.clone(), m))
                .collect(),
        }
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentialsProvider {
    async fn resolve(&self, access_key: &str) -> Result<CredentialMapping, ResolveError> {
        self.mappings
            .get(access_key)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(access_key.to_owned()))
    }
}
