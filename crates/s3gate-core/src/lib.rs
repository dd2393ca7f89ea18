//! Core pipeline types for the S3Gate proxy.
//!
//! This crate holds the pieces of the proxy that are independent of any HTTP
//! framework: the raw-byte object-key codec, the multipart upload
//! coordinator, the proxy-wide error taxonomy, and the environment-driven
//! configuration.
//!
//! # Modules
//!
//! - [`config`] - Environment-driven configuration with eager validation
//! - [`error`] - The proxy error taxonomy and its HTTP status mapping
//! - [`key`] - Wire-faithful object key representation
//! - [`multipart`] - In-flight multipart upload session tracking
//! - [`parts_xml`] - CompleteMultipartUpload part-list XML codec

pub mod config;
pub mod error;
pub mod key;
pub mod multipart;
pub mod parts_xml;

pub use config::{CredentialsBackend, ProxyConfig};
pub use error::ProxyError;
pub use key::ObjectKey;
pub use multipart::{MultipartError, MultipartTracker, RecordedPart, SubmittedPart, UploadSession};
