//! Credential resolution for the S3Gate proxy.
//!
//! Clients sign requests with *emulated* credentials the proxy issued to
//! them; the proxy maps each emulated access key to the emulated secret (to
//! verify the inbound signature) and to the *backend* credential pair (to
//! re-sign the forwarded request). That mapping is served by a
//! [`CredentialsProvider`], a capability interface with two concrete
//! variants:
//!
//! - [`StaticCredentialsProvider`] - fixed in-memory mappings for tests and
//!   single-tenant deployments.
//! - [`HttpCredentialsProvider`] - fetches mappings from a remote HTTP
//!   service, with configurable extra headers and a TTL cache.
//!
//! An unknown access key is [`ResolveError::NotFound`] and means the request
//! is unauthenticated; a failure to reach the mapping service is
//! [`ResolveError::Backend`] and is a server-side error. The two are never
//! conflated.

pub mod error;
pub mod http;
pub mod provider;
pub mod types;

pub use error::{ConfigError, ResolveError};
pub use http::{HttpCredentialsProvider, HttpCredentialsProviderConfig};
pub use provider::{CredentialsProvider, StaticCredentialsProvider};
pub use types::{CredentialMapping, CredentialPair};
