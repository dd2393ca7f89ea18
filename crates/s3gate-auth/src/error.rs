//! Error types for SigV4 authentication.
//!
//! Every variant maps to an access-denied response at the HTTP layer; the
//! distinctions exist for logging and tests, never for the client.

/// Errors that can occur while verifying a SigV4-signed request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The `Authorization` header is missing from the request.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header could not be parsed.
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// The signing algorithm is not `AWS4-HMAC-SHA256`.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The `Credential` component does not match
    /// `AKID/date/region/service/aws4_request`.
    #[error("Invalid credential scope format")]
    InvalidCredential,

    /// A header listed in `SignedHeaders` is absent from the request.
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// The `x-amz-date` timestamp is outside the accepted clock-skew window.
    #[error("Request timestamp is outside the accepted window")]
    RequestExpired,

    /// The computed signature does not match the one supplied by the client.
    #[error("Signature does not match")]
    SignatureDoesNotMatch,
}
