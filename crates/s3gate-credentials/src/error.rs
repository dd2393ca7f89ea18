//! Error types for credential resolution and provider configuration.

/// Errors from resolving an emulated access key.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No mapping exists for the access key. The request must be rejected as
    /// unauthenticated; there is no anonymous fallback.
    #[error("Unknown access key: {0}")]
    NotFound(String),

    /// The mapping service could not be reached or returned an error.
    /// Surfaced as a server-side failure, never as an authentication one.
    #[error("Credential resolution failed: {0}")]
    Backend(String),
}

/// Errors raised while loading provider configuration.
///
/// All variants are produced eagerly at startup; a malformed configuration
/// never survives to request time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The required endpoint URI is missing or unparsable.
    #[error("Invalid credentials endpoint: {0}")]
    InvalidEndpoint(String),

    /// A header specification has no colon separating name and value.
    #[error("Malformed header specification (expected \"name: value\"): {0}")]
    MalformedHeader(String),

    /// A header name or value is not a legal HTTP header.
    #[error("Invalid header {name}: {reason}")]
    InvalidHeader {
        /// The offending header name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}
