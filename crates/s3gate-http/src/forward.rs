//! Request forwarding to the storage backend.
//!
//! The forwarder rebuilds each verified request against the backend endpoint:
//! client authentication headers are stripped, a fresh `x-amz-date` is
//! stamped, and the request is re-signed with the backend credential pair
//! over exactly the path and query that go on the wire. Request and response
//! bodies stream; the proxy never buffers a passthrough payload.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use s3gate_auth::sigv4::{format_amz_date, sign_request};
use s3gate_core::ProxyError;
use s3gate_credentials::CredentialPair;
use tracing::{debug, warn};

use crate::body::ProxyBody;
use crate::router::RoutedRequest;

/// Request headers that never cross the proxy.
///
/// Hop-by-hop headers plus the client-side authentication headers the proxy
/// replaces. `content-length` is omitted too; the outgoing body decides its
/// own framing.
const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "authorization",
    "connection",
    "content-length",
    "expect",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "x-amz-content-sha256",
    "x-amz-date",
];

/// Response headers the proxy does not relay.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &["connection", "keep-alive", "transfer-encoding"];

/// Forwards requests to a single storage backend.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    endpoint: String,
}

impl Forwarder {
    /// Create a forwarder for the given backend endpoint.
    ///
    /// # Errors
    ///
    /// [`ProxyError::Backend`] when the HTTP client cannot be constructed.
    pub fn new(endpoint: &str) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProxyError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
        })
    }

    /// Forward a request and return the raw backend response.
    ///
    /// `payload_hash` is the value for the outgoing `x-amz-content-sha256`
    /// header; for relayed bodies it is the hash the client declared, for
    /// rewritten bodies it is recomputed by the caller.
    ///
    /// # Errors
    ///
    /// [`ProxyError::Backend`] for an unbuildable URL or a transport failure.
    /// Backend HTTP error statuses are not errors here; they relay.
    pub async fn send(
        &self,
        method: http::Method,
        routed: &RoutedRequest,
        headers: &http::HeaderMap,
        body: reqwest::Body,
        payload_hash: &str,
        backend: &CredentialPair,
        region: &str,
    ) -> Result<reqwest::Response, ProxyError> {
        let mut url = format!("{}{}", self.endpoint, routed.backend_path);
        if let Some(query) = &routed.raw_query {
            let _ = write!(url, "?{query}");
        }
        let url = reqwest::Url::parse(&url).map_err(|e| ProxyError::Backend(e.to_string()))?;

        let forwarded = forwardable_headers(headers);
        let timestamp = format_amz_date(chrono::Utc::now());
        let authorization = sign_outbound(
            &method,
            routed,
            &url,
            &forwarded,
            payload_hash,
            &timestamp,
            backend,
            region,
        );

        debug!(%method, %url, "forwarding to backend");

        self.client
            .request(method, url)
            .headers(forwarded)
            .header("x-amz-date", &timestamp)
            .header("x-amz-content-sha256", payload_hash)
            .header(http::header::AUTHORIZATION, authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "backend unreachable");
                ProxyError::Backend(e.to_string())
            })
    }
}

/// Copy the client's headers minus the stripped set.
fn forwardable_headers(headers: &http::HeaderMap) -> http::HeaderMap {
    let mut forwarded = http::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if STRIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

/// Compute the backend-facing `Authorization` header.
///
/// Signed headers are `host`, the two `x-amz-*` headers the forwarder sets,
/// and every forwarded `x-amz-*` header, over the wire-level path and query.
#[allow(clippy::too_many_arguments)]
fn sign_outbound(
    method: &http::Method,
    routed: &RoutedRequest,
    url: &reqwest::Url,
    forwarded: &http::HeaderMap,
    payload_hash: &str,
    timestamp: &str,
    backend: &CredentialPair,
    region: &str,
) -> String {
    let mut host = url.host_str().unwrap_or_default().to_owned();
    if let Some(port) = url.port() {
        let _ = write!(host, ":{port}");
    }

    // Repeated header names collapse to one signed entry with the values
    // comma-joined; SignedHeaders never lists a name twice.
    let mut amz: BTreeMap<&str, String> = BTreeMap::new();
    for (name, value) in forwarded {
        if name.as_str().starts_with("x-amz-") {
            if let Ok(value) = value.to_str() {
                amz.entry(name.as_str())
                    .and_modify(|joined| {
                        joined.push(',');
                        joined.push_str(value);
                    })
                    .or_insert_with(|| value.to_owned());
            }
        }
    }

    let mut signed: Vec<(&str, &str)> = vec![
        ("host", host.as_str()),
        ("x-amz-content-sha256", payload_hash),
        ("x-amz-date", timestamp),
    ];
    for (name, value) in &amz {
        signed.push((name, value.as_str()));
    }
    signed.sort_unstable_by_key(|(name, _)| *name);

    sign_request(
        method.as_str(),
        &routed.backend_path,
        routed.raw_query.as_deref().unwrap_or(""),
        &signed,
        payload_hash,
        &backend.access_key,
        &backend.secret_key,
        region,
        timestamp,
    )
}

/// Relay a backend response as a streaming proxy response.
#[must_use]
pub fn relay_response(response: reqwest::Response) -> http::Response<ProxyBody> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = ProxyBody::from_stream(response.bytes_stream());
    assemble_response(status, &headers, body)
}

/// Build a proxy response from already-buffered backend status, headers, and
/// body.
#[must_use]
pub fn buffered_response(
    status: http::StatusCode,
    headers: &http::HeaderMap,
    body: bytes::Bytes,
) -> http::Response<ProxyBody> {
    let body = if body.is_empty() {
        ProxyBody::empty()
    } else {
        ProxyBody::from_bytes(body)
    };
    assemble_response(status, headers, body)
}

fn assemble_response(
    status: http::StatusCode,
    headers: &http::HeaderMap,
    body: ProxyBody,
) -> http::Response<ProxyBody> {
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    let out = response.headers_mut();
    for (name, value) in headers {
        if STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    response
}
