//! The proxy HTTP service implementing hyper's `Service` trait.
//!
//! [`ProxyService`] runs every request through the same pipeline:
//!
//! 1. Health check interception (`GET /_health`)
//! 2. Routing: bucket/key extraction and multipart operation detection
//! 3. SigV4 parsing, credential resolution, and verification
//! 4. Dispatch: multipart coordination or straight forwarding
//! 5. Common response headers (`x-amz-request-id`, `Server`)
//!
//! Verification happens before any byte reaches the backend; a request that
//! fails authentication is answered locally.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyDataStream, BodyExt};
use hyper::body::Incoming;
use hyper::service::Service;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use s3gate_auth::{declared_payload_hash, parse_authorization, verify_request};
use s3gate_core::multipart::RecordedPart;
use s3gate_core::{MultipartError, MultipartTracker, ProxyConfig, ProxyError, parts_xml};
use s3gate_credentials::{CredentialMapping, CredentialsProvider};

use crate::body::ProxyBody;
use crate::forward::{Forwarder, buffered_response, relay_response};
use crate::response::error_to_response;
use crate::router::{ProxyOperation, ProxyRouter, RoutedRequest};

/// Shared state behind every clone of the service.
struct ProxyState {
    router: ProxyRouter,
    forwarder: Forwarder,
    provider: Arc<dyn CredentialsProvider>,
    tracker: MultipartTracker,
    max_skew: chrono::Duration,
}

impl std::fmt::Debug for ProxyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyState")
            .field("router", &self.router)
            .field("forwarder", &self.forwarder)
            .finish_non_exhaustive()
    }
}

/// The proxy service. Cheap to clone; all clones share one state.
#[derive(Debug, Clone)]
pub struct ProxyService {
    state: Arc<ProxyState>,
}

impl ProxyService {
    /// Build the service from configuration and a credentials provider.
    ///
    /// # Errors
    ///
    /// [`ProxyError::Backend`] when the forwarding client cannot be built.
    pub fn new(
        config: &ProxyConfig,
        provider: Arc<dyn CredentialsProvider>,
    ) -> Result<Self, ProxyError> {
        let router = ProxyRouter::new(config.s3_domain.clone(), config.virtual_hosting);
        let forwarder = Forwarder::new(&config.backend_endpoint)?;
        Ok(Self {
            state: Arc::new(ProxyState {
                router,
                forwarder,
                provider,
                tracker: MultipartTracker::new(),
                max_skew: config.max_skew,
            }),
        })
    }

    /// The multipart session table, for shutdown teardown.
    #[must_use]
    pub fn tracker(&self) -> &MultipartTracker {
        &self.state.tracker
    }
}

impl Service<http::Request<Incoming>> for ProxyService {
    type Response = http::Response<ProxyBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let state = Arc::clone(&self.state);

        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let response = match process_request(&state, req, &request_id).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(error = %err, request_id, "request rejected");
                    error_to_response(&err, &request_id)
                }
            };
            Ok(add_common_headers(response, &request_id))
        })
    }
}

async fn process_request(
    state: &ProxyState,
    req: http::Request<Incoming>,
    request_id: &str,
) -> Result<http::Response<ProxyBody>, ProxyError> {
    let (parts, incoming) = req.into_parts();
    debug!(method = %parts.method, uri = %parts.uri, request_id, "processing request");

    if is_health_check(&parts.method, parts.uri.path()) {
        return Ok(health_check_response());
    }

    let routed = state.router.route(&parts)?;

    // Authentication first: nothing reaches the backend unverified.
    let auth = parse_authorization(&parts)?;
    let mapping = state.provider.resolve(&auth.access_key_id).await?;
    let payload_hash = declared_payload_hash(&parts);
    let verified = verify_request(
        &parts,
        &auth,
        &payload_hash,
        &mapping.emulated.secret_key,
        chrono::Utc::now(),
        state.max_skew,
    )?;

    info!(
        access_key = %verified.access_key_id,
        bucket = ?routed.bucket,
        key = ?routed.key,
        operation = ?routed.operation,
        request_id,
        "request verified"
    );

    match routed.operation.clone() {
        ProxyOperation::Passthrough => {
            let body = reqwest::Body::wrap_stream(BodyDataStream::new(incoming));
            let response = state
                .forwarder
                .send(
                    parts.method.clone(),
                    &routed,
                    &parts.headers,
                    body,
                    &payload_hash,
                    &mapping.backend,
                    &verified.region,
                )
                .await?;
            Ok(relay_response(response))
        }
        ProxyOperation::CreateMultipartUpload => {
            handle_create(state, &parts, incoming, &routed, &mapping, &verified.region).await
        }
        ProxyOperation::UploadPart {
            part_number,
            upload_id,
        } => {
            handle_upload_part(
                state,
                &parts,
                incoming,
                &routed,
                &mapping,
                &verified.region,
                &payload_hash,
                part_number,
                &upload_id,
            )
            .await
        }
        ProxyOperation::CompleteMultipartUpload { upload_id } => {
            handle_complete(state, &parts, incoming, &routed, &mapping, &verified.region, &upload_id)
                .await
        }
        ProxyOperation::AbortMultipartUpload { upload_id } => {
            handle_abort(state, &parts, incoming, &routed, &mapping, &verified.region, &upload_id)
                .await
        }
    }
}

/// Open a multipart session: forward, then register the backend-issued
/// upload id.
async fn handle_create(
    state: &ProxyState,
    parts: &http::request::Parts,
    incoming: Incoming,
    routed: &RoutedRequest,
    mapping: &CredentialMapping,
    region: &str,
) -> Result<http::Response<ProxyBody>, ProxyError> {
    let body = collect_body(incoming).await?;
    let hash = hex_sha256(&body);

    let response = state
        .forwarder
        .send(
            parts.method.clone(),
            routed,
            &parts.headers,
            reqwest::Body::from(body),
            &hash,
            &mapping.backend,
            region,
        )
        .await?;

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProxyError::Backend(e.to_string()))?;

    if status.is_success() {
        let xml = std::str::from_utf8(&bytes)
            .map_err(|e| ProxyError::Backend(format!("non-UTF-8 initiate response: {e}")))?;
        let upload_id = parts_xml::parse_upload_id(xml)
            .map_err(|e| ProxyError::Backend(format!("unusable initiate response: {e}")))?;

        let bucket = routed.bucket.clone().unwrap_or_default();
        let key = routed
            .key
            .clone()
            .ok_or_else(|| ProxyError::Routing("multipart create without key".to_owned()))?;
        info!(upload_id, bucket, "multipart upload opened");
        state.tracker.register(upload_id, bucket, key);
    }

    Ok(buffered_response(status, &headers, bytes))
}

/// Relay a part upload, recording its ETag once the backend accepts it.
#[allow(clippy::too_many_arguments)]
async fn handle_upload_part(
    state: &ProxyState,
    parts: &http::request::Parts,
    incoming: Incoming,
    routed: &RoutedRequest,
    mapping: &CredentialMapping,
    region: &str,
    payload_hash: &str,
    part_number: u32,
    upload_id: &str,
) -> Result<http::Response<ProxyBody>, ProxyError> {
    if state.tracker.session(upload_id).is_none() {
        return Err(MultipartError::NoSuchUpload(upload_id.to_owned()).into());
    }

    let size = content_length(parts);
    let body = reqwest::Body::wrap_stream(BodyDataStream::new(incoming));
    let response = state
        .forwarder
        .send(
            parts.method.clone(),
            routed,
            &parts.headers,
            body,
            payload_hash,
            &mapping.backend,
            region,
        )
        .await?;

    if response.status().is_success() {
        let etag = response
            .headers()
            .get(http::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        debug!(upload_id, part_number, %etag, "part accepted");
        note_recorded_part(
            &state.tracker,
            upload_id,
            RecordedPart {
                part_number,
                etag,
                size,
            },
        );
    }

    Ok(relay_response(response))
}

/// Close a multipart session: validate the client's part list against the
/// recorded parts, forward the sorted list, and consume the session only on
/// backend success.
async fn handle_complete(
    state: &ProxyState,
    parts: &http::request::Parts,
    incoming: Incoming,
    routed: &RoutedRequest,
    mapping: &CredentialMapping,
    region: &str,
    upload_id: &str,
) -> Result<http::Response<ProxyBody>, ProxyError> {
    let body = collect_body(incoming).await?;
    let xml = std::str::from_utf8(&body)
        .map_err(|e| MultipartError::MalformedPartList(e.to_string()))?;
    let submitted = parts_xml::parse_complete_request(xml)?;
    let ordered = state.tracker.prepare_complete(upload_id, submitted)?;

    let rewritten = parts_xml::render_complete_request(&ordered);
    let hash = hex_sha256(rewritten.as_bytes());

    // The body changed, so its checksum header no longer holds.
    let mut headers = parts.headers.clone();
    headers.remove("content-md5");

    let response = state
        .forwarder
        .send(
            parts.method.clone(),
            routed,
            &headers,
            reqwest::Body::from(rewritten),
            &hash,
            &mapping.backend,
            region,
        )
        .await?;

    let status = response.status();
    let response_headers = response.headers().clone();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProxyError::Backend(e.to_string()))?;

    if status.is_success() {
        info!(upload_id, "multipart upload completed");
        state.tracker.finish(upload_id);
    }

    Ok(buffered_response(status, &response_headers, bytes))
}

/// Abort a multipart session: forward, then discard the local session.
async fn handle_abort(
    state: &ProxyState,
    parts: &http::request::Parts,
    incoming: Incoming,
    routed: &RoutedRequest,
    mapping: &CredentialMapping,
    region: &str,
    upload_id: &str,
) -> Result<http::Response<ProxyBody>, ProxyError> {
    if state.tracker.session(upload_id).is_none() {
        return Err(MultipartError::NoSuchUpload(upload_id.to_owned()).into());
    }

    let body = collect_body(incoming).await?;
    let hash = hex_sha256(&body);
    let response = state
        .forwarder
        .send(
            parts.method.clone(),
            routed,
            &parts.headers,
            reqwest::Body::from(body),
            &hash,
            &mapping.backend,
            region,
        )
        .await?;

    // The session is gone once the backend has dropped the upload; a 404
    // means it was already gone there.
    if response.status().is_success() || response.status() == http::StatusCode::NOT_FOUND {
        info!(upload_id, "multipart upload aborted");
        let _ = state.tracker.abort(upload_id);
    }

    Ok(relay_response(response))
}

/// Record a backend-accepted part against its session.
///
/// The session may have been aborted while the part was in flight; the
/// backend already took the bytes, so the response still relays and the
/// lost recording is only logged.
fn note_recorded_part(tracker: &MultipartTracker, upload_id: &str, part: RecordedPart) {
    let part_number = part.part_number;
    if let Err(e) = tracker.record_part(upload_id, part) {
        warn!(
            upload_id,
            part_number,
            error = %e,
            "backend accepted a part for a session no longer tracked"
        );
    }
}

/// Collect the full inbound body.
async fn collect_body(incoming: Incoming) -> Result<Bytes, ProxyError> {
    incoming
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .map_err(|e| ProxyError::Backend(format!("failed to read request body: {e}")))
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn content_length(parts: &http::request::Parts) -> u64 {
    parts
        .headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Check if the request is a health check probe.
fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET && (path == "/_health" || path == "/health")
}

/// Produce a health check response.
fn health_check_response() -> http::Response<ProxyBody> {
    let mut response = http::Response::new(ProxyBody::from_string(
        r#"{"status":"running","service":"s3gate"}"#,
    ));
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Add common response headers to every response.
fn add_common_headers(
    mut response: http::Response<ProxyBody>,
    request_id: &str,
) -> http::Response<ProxyBody> {
    let headers = response.headers_mut();
    if let Ok(hv) = http::header::HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", hv);
    }
    headers.insert(
        http::header::SERVER,
        http::header::HeaderValue::from_static("S3Gate"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_tolerate_part_recorded_after_abort() {
        let tracker = MultipartTracker::new();
        tracker.register("upload-1", "three", s3gate_core::ObjectKey::from_raw("multi"));
        tracker.abort("upload-1").expect("session registered");

        // The backend accepted the bytes before the abort landed; recording
        // quietly misses and the session stays gone.
        note_recorded_part(
            &tracker,
            "upload-1",
            RecordedPart {
                part_number: 1,
                etag: "\"etag-1\"".to_owned(),
                size: 5,
            },
        );
        assert!(tracker.session("upload-1").is_none());
    }

    #[test]
    fn test_should_detect_health_check_paths() {
        assert!(is_health_check(&http::Method::GET, "/_health"));
        assert!(is_health_check(&http::Method::GET, "/health"));
        assert!(!is_health_check(&http::Method::POST, "/_health"));
        assert!(!is_health_check(&http::Method::GET, "/three"));
    }

    #[test]
    fn test_should_produce_health_check_response() {
        let response = health_check_response();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json"),
        );
    }

    #[test]
    fn test_should_add_common_headers() {
        let response = http::Response::new(ProxyBody::empty());
        let response = add_common_headers(response, "req-42");
        assert_eq!(
            response
                .headers()
                .get("x-amz-request-id")
                .and_then(|v| v.to_str().ok()),
            Some("req-42"),
        );
        assert_eq!(
            response
                .headers()
                .get(http::header::SERVER)
                .and_then(|v| v.to_str().ok()),
            Some("S3Gate"),
        );
    }

    #[test]
    fn test_should_parse_content_length() {
        let (parts, ()) = http::Request::builder()
            .method(http::Method::PUT)
            .uri("/three/multi?partNumber=1&uploadId=x")
            .header("content-length", "5242880")
            .body(())
            .expect("valid request")
            .into_parts();
        assert_eq!(content_length(&parts), 5_242_880);
    }

    #[test]
    fn test_should_default_missing_content_length_to_zero() {
        let (parts, ()) = http::Request::builder()
            .uri("/three/multi")
            .body(())
            .expect("valid request")
            .into_parts();
        assert_eq!(content_length(&parts), 0);
    }

    #[test]
    fn test_should_hash_empty_body_to_known_digest() {
        assert_eq!(
            hex_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        );
    }
}
