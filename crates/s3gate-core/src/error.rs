//! Proxy-wide error taxonomy.
//!
//! Every failure on the request path collapses into [`ProxyError`], which
//! carries enough structure to pick the S3 error code and HTTP status for the
//! client-facing XML error body. Authentication failures deliberately map to
//! the same coarse statuses regardless of cause so that probing the proxy
//! does not reveal which stage rejected the request.

use s3gate_auth::AuthError;
use s3gate_credentials::ResolveError;
use thiserror::Error;

use crate::multipart::MultipartError;

/// Top-level error for the proxy request pipeline.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// SigV4 parsing or verification failed.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// The credentials provider could not produce a mapping.
    #[error("credential resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    /// The storage backend was unreachable or returned garbage.
    #[error("backend error: {0}")]
    Backend(String),

    /// Multipart coordination failed.
    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),

    /// The request did not map to a bucket and key.
    #[error("unroutable request: {0}")]
    Routing(String),
}

impl ProxyError {
    /// The HTTP status code to answer the client with.
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            // An unknown access key is indistinguishable from a bad
            // signature from the client's point of view.
            Self::Authentication(_) | Self::Resolution(ResolveError::NotFound(_)) => {
                http::StatusCode::FORBIDDEN
            }
            Self::Resolution(ResolveError::Backend(_)) | Self::Backend(_) => {
                http::StatusCode::BAD_GATEWAY
            }
            Self::Multipart(e) => match e {
                MultipartError::NoSuchUpload(_) => http::StatusCode::NOT_FOUND,
                MultipartError::InvalidPart(_) | MultipartError::MalformedPartList(_) => {
                    http::StatusCode::BAD_REQUEST
                }
            },
            Self::Routing(_) => http::StatusCode::BAD_REQUEST,
        }
    }

    /// The S3 error code for the XML error body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication(AuthError::SignatureDoesNotMatch) => "SignatureDoesNotMatch",
            Self::Authentication(AuthError::RequestExpired) => "RequestTimeTooSkewed",
            Self::Authentication(_) | Self::Resolution(ResolveError::NotFound(_)) => "AccessDenied",
            Self::Resolution(ResolveError::Backend(_)) | Self::Backend(_) => "InternalError",
            Self::Multipart(e) => match e {
                MultipartError::NoSuchUpload(_) => "NoSuchUpload",
                MultipartError::InvalidPart(_) => "InvalidPart",
                MultipartError::MalformedPartList(_) => "MalformedXML",
            },
            Self::Routing(_) => "InvalidRequest",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_signature_mismatch_to_forbidden() {
        let err = ProxyError::Authentication(AuthError::SignatureDoesNotMatch);
        assert_eq!(err.status(), http::StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "SignatureDoesNotMatch");
    }

    #[test]
    fn test_should_map_skewed_clock_to_forbidden() {
        let err = ProxyError::Authentication(AuthError::RequestExpired);
        assert_eq!(err.status(), http::StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "RequestTimeTooSkewed");
    }

    #[test]
    fn test_should_hide_unknown_access_key_behind_access_denied() {
        let err = ProxyError::Resolution(ResolveError::NotFound("AKIDEXAMPLE".to_owned()));
        assert_eq!(err.status(), http::StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "AccessDenied");
    }

    #[test]
    fn test_should_map_resolver_outage_to_bad_gateway() {
        let err = ProxyError::Resolution(ResolveError::Backend("connect refused".to_owned()));
        assert_eq!(err.status(), http::StatusCode::BAD_GATEWAY);
        assert_eq!(err.code(), "InternalError");
    }

    #[test]
    fn test_should_map_unknown_upload_to_not_found() {
        let err = ProxyError::Multipart(MultipartError::NoSuchUpload("abc".to_owned()));
        assert_eq!(err.status(), http::StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NoSuchUpload");
    }

    #[test]
    fn test_should_map_invalid_part_to_bad_request() {
        let err = ProxyError::Multipart(MultipartError::InvalidPart(3));
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "InvalidPart");
    }

    #[test]
    fn test_should_map_unroutable_request_to_bad_request() {
        let err = ProxyError::Routing("no bucket in path".to_owned());
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "InvalidRequest");
    }
}
