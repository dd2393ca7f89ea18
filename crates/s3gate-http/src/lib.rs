//! HTTP service layer for the S3Gate proxy.
//!
//! This crate wires the verification and coordination pieces into a
//! hyper-compatible service:
//!
//! - [`router`] - bucket/key extraction and multipart operation detection
//! - [`service`] - the request pipeline (verify, resolve, dispatch)
//! - [`forward`] - backend forwarding with re-signing
//! - [`body`] - the buffered/empty/streaming response body
//! - [`response`] - error-to-XML serialization

pub mod body;
pub mod forward;
pub mod response;
pub mod router;
pub mod service;

pub use body::ProxyBody;
pub use forward::Forwarder;
pub use router::{ProxyOperation, ProxyRouter, RoutedRequest};
pub use service::ProxyService;
