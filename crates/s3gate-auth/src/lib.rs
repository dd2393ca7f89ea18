//! AWS Signature Version 4 verification and signing for the S3Gate proxy.
//!
//! The proxy sits on both sides of the SigV4 protocol: it verifies inbound
//! requests signed with emulated credentials, and it re-signs the rewritten
//! request with the real backend credentials before forwarding. Both
//! directions share one canonicalization implementation so the proxy cannot
//! drift from its own verification rules.
//!
//! A detail that matters more here than in a plain S3 server: the canonical
//! URI pass never decodes percent-escapes that are already present in the
//! request path. `a=1%2Fb=2` and `a=1/b=2` are different object keys and must
//! produce different canonical requests, signatures, and backend paths.
//!
//! # Modules
//!
//! - [`canonical`] - Canonical request construction per the SigV4 specification
//! - [`error`] - Authentication error types
//! - [`sigv4`] - Verification of inbound requests and signing of outbound ones

pub mod canonical;
pub mod error;
pub mod sigv4;

pub use error::AuthError;
pub use sigv4::{
    ParsedAuthorization, VerifiedRequest, declared_payload_hash, parse_authorization,
    sign_request, verify_request,
};
