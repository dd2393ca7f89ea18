//! Request routing: bucket extraction and multipart operation detection.
//!
//! The router decides two things per request: which bucket and object key the
//! request addresses (from the Host header in virtual-hosted style, or from
//! the first path segment in path style), and whether the request is one of
//! the multipart operations the proxy coordinates. Everything else is a
//! passthrough.
//!
//! Nothing here percent-decodes. The object key, the backend path, and the
//! query string are carried byte for byte as they arrived; `a=1%2Fb=2` and
//! `a=1/b=2` stay different requests all the way to the backend.

use http::Method;
use s3gate_core::{ObjectKey, ProxyError};

/// Operations the proxy treats specially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOperation {
    /// `POST /{bucket}/{key}?uploads` - opens a multipart session.
    CreateMultipartUpload,
    /// `PUT /{bucket}/{key}?partNumber=N&uploadId=ID`.
    UploadPart {
        /// The part number from the query string.
        part_number: u32,
        /// The upload the part belongs to.
        upload_id: String,
    },
    /// `POST /{bucket}/{key}?uploadId=ID` - closes a multipart session.
    CompleteMultipartUpload {
        /// The upload being completed.
        upload_id: String,
    },
    /// `DELETE /{bucket}/{key}?uploadId=ID` - discards a multipart session.
    AbortMultipartUpload {
        /// The upload being aborted.
        upload_id: String,
    },
    /// Anything else: relayed to the backend without coordination.
    Passthrough,
}

/// The outcome of routing a request.
#[derive(Debug, Clone)]
pub struct RoutedRequest {
    /// The addressed bucket, if the request names one.
    pub bucket: Option<String>,
    /// The raw object key, if the request names one.
    pub key: Option<ObjectKey>,
    /// What the proxy must do with the request.
    pub operation: ProxyOperation,
    /// The path-style path the backend will see, byte for byte.
    pub backend_path: String,
    /// The raw query string, without the leading `?`.
    pub raw_query: Option<String>,
}

/// Routing configuration.
#[derive(Debug, Clone)]
pub struct ProxyRouter {
    domain: Option<String>,
    virtual_hosting: bool,
}

impl ProxyRouter {
    /// Create a router.
    #[must_use]
    pub fn new(domain: Option<String>, virtual_hosting: bool) -> Self {
        Self {
            domain,
            virtual_hosting,
        }
    }

    /// Route a request.
    ///
    /// Virtual-hosted requests are rewritten to path style for the backend
    /// (`/{bucket}{original-path}`); path-style requests keep their original
    /// path untouched.
    ///
    /// # Errors
    ///
    /// [`ProxyError::Routing`] for a multipart request with an unusable
    /// `partNumber`, or an object-level POST that is neither a create nor a
    /// complete.
    pub fn route(&self, parts: &http::request::Parts) -> Result<RoutedRequest, ProxyError> {
        let raw_path = parts.uri.path();
        let raw_query = parts.uri.query().map(ToOwned::to_owned);

        let vhost_bucket = if self.virtual_hosting {
            self.domain
                .as_deref()
                .and_then(|domain| extract_virtual_host_bucket(&parts.headers, domain))
        } else {
            None
        };

        let (bucket, key, backend_path) = if let Some(bucket) = vhost_bucket {
            // Host names the bucket; the whole path is the key.
            let key = match raw_path.strip_prefix('/') {
                None | Some("") => None,
                Some(raw) => Some(ObjectKey::from_raw(raw)),
            };
            let backend_path = format!("/{bucket}{raw_path}");
            (Some(bucket), key, backend_path)
        } else {
            let (bucket, key) = split_path(raw_path);
            (bucket, key, raw_path.to_owned())
        };

        let operation = if key.is_some() {
            classify_object_operation(&parts.method, raw_query.as_deref().unwrap_or(""))?
        } else {
            ProxyOperation::Passthrough
        };

        Ok(RoutedRequest {
            bucket,
            key,
            operation,
            backend_path,
            raw_query,
        })
    }
}

/// Extract the bucket name from a virtual-hosted-style Host header.
///
/// `mybucket.s3.example.com:9000` with domain `s3.example.com` yields
/// `mybucket`.
fn extract_virtual_host_bucket(headers: &http::HeaderMap, domain: &str) -> Option<String> {
    let host = headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())?;
    let host = host.split(':').next().unwrap_or(host);

    let suffix = format!(".{domain}");
    let bucket = host.strip_suffix(&suffix)?;
    (!bucket.is_empty()).then(|| bucket.to_owned())
}

/// Split a raw path into bucket and key without decoding either.
fn split_path(path: &str) -> (Option<String>, Option<ObjectKey>) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return (None, None);
    }

    match trimmed.split_once('/') {
        Some((bucket, "")) => (Some(bucket.to_owned()), None),
        Some((bucket, key)) => (Some(bucket.to_owned()), Some(ObjectKey::from_raw(key))),
        None => (Some(trimmed.to_owned()), None),
    }
}

/// Split a raw query string into raw pairs. No decoding.
fn raw_query_pairs(query: &str) -> Vec<(&str, &str)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect()
}

fn query_value<'a>(pairs: &[(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Detect the multipart operations on an object-level request.
fn classify_object_operation(method: &Method, query: &str) -> Result<ProxyOperation, ProxyError> {
    let pairs = raw_query_pairs(query);
    let upload_id = query_value(&pairs, "uploadId");

    match *method {
        Method::POST => {
            if query_value(&pairs, "uploads").is_some() {
                return Ok(ProxyOperation::CreateMultipartUpload);
            }
            if let Some(id) = upload_id {
                return Ok(ProxyOperation::CompleteMultipartUpload {
                    upload_id: id.to_owned(),
                });
            }
            Err(ProxyError::Routing(
                "POST to an object requires ?uploads or ?uploadId".to_owned(),
            ))
        }
        Method::PUT => match (query_value(&pairs, "partNumber"), upload_id) {
            (Some(number), Some(id)) => {
                let part_number = number
                    .parse::<u32>()
                    .ok()
                    .filter(|n| (1..=10_000).contains(n))
                    .ok_or_else(|| {
                        ProxyError::Routing(format!("invalid partNumber: {number}"))
                    })?;
                Ok(ProxyOperation::UploadPart {
                    part_number,
                    upload_id: id.to_owned(),
                })
            }
            _ => Ok(ProxyOperation::Passthrough),
        },
        Method::DELETE => Ok(upload_id.map_or(ProxyOperation::Passthrough, |id| {
            ProxyOperation::AbortMultipartUpload {
                upload_id: id.to_owned(),
            }
        })),
        _ => Ok(ProxyOperation::Passthrough),
    }
}
