//! In-flight multipart upload session tracking.
//!
//! The proxy keeps its own view of every multipart upload it has forwarded a
//! `CreateMultipartUpload` for: upload id, target bucket/key, and the parts
//! recorded so far. Parts arrive concurrently and out of order; the part map
//! is keyed by part number with last-writer-wins semantics per number, and
//! two different part numbers never contend. `CompleteMultipartUpload`
//! validates the client's part list against the recorded parts and sorts it
//! by ascending part number before it reaches the backend, so arrival order
//! never influences the assembled object.
//!
//! A part is recorded only after the backend returned its ETag, which gives
//! completion the happens-before it needs: it can only observe parts whose
//! upload calls have already returned to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::key::ObjectKey;

/// Errors from multipart protocol violations. Always client errors.
#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    /// The upload id is not (or no longer) tracked.
    #[error("The specified upload does not exist: {0}")]
    NoSuchUpload(String),

    /// A submitted part number has no recorded upload, or its ETag does not
    /// match the one the backend returned.
    #[error("One or more of the specified parts could not be found: part {0}")]
    InvalidPart(u32),

    /// The CompleteMultipartUpload body could not be parsed.
    #[error("The XML you provided was not well-formed: {0}")]
    MalformedPartList(String),
}

/// A part the backend has acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPart {
    /// The part number (1-based).
    pub part_number: u32,
    /// The ETag the backend assigned to this part.
    pub etag: String,
    /// Size of the part body in bytes.
    pub size: u64,
}

/// A part as submitted in a CompleteMultipartUpload request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedPart {
    /// The part number (1-based).
    pub part_number: u32,
    /// The ETag the client received from its UploadPart call.
    pub etag: String,
}

/// One in-flight multipart upload.
#[derive(Debug)]
pub struct UploadSession {
    /// Target bucket.
    pub bucket: String,
    /// Target key, wire-faithful.
    pub key: ObjectKey,
    /// When the session was registered.
    pub initiated: DateTime<Utc>,
    parts: DashMap<u32, RecordedPart>,
}

impl UploadSession {
    fn new(bucket: String, key: ObjectKey) -> Self {
        Self {
            bucket,
            key,
            initiated: Utc::now(),
            parts: DashMap::new(),
        }
    }

    /// Record a backend-acknowledged part. Re-uploading a part number
    /// replaces the previous record.
    pub fn record_part(&self, part: RecordedPart) {
        self.parts.insert(part.part_number, part);
    }

    /// Look up a recorded part by number.
    #[must_use]
    pub fn part(&self, part_number: u32) -> Option<RecordedPart> {
        self.parts.get(&part_number).map(|p| p.clone())
    }

    /// Number of distinct parts recorded so far.
    #[must_use]
    pub fn parts_count(&self) -> usize {
        self.parts.len()
    }
}

/// Process-scoped table of in-flight multipart uploads.
///
/// Created at startup, shared across request tasks, drained on shutdown.
/// Sessions for different uploads never contend with each other.
#[derive(Debug, Default)]
pub struct MultipartTracker {
    sessions: DashMap<String, Arc<UploadSession>>,
}

impl MultipartTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for a backend-issued upload id.
    pub fn register(&self, upload_id: impl Into<String>, bucket: impl Into<String>, key: ObjectKey) {
        self.sessions.insert(
            upload_id.into(),
            Arc::new(UploadSession::new(bucket.into(), key)),
        );
    }

    /// Fetch the session for an upload id.
    #[must_use]
    pub fn session(&self, upload_id: &str) -> Option<Arc<UploadSession>> {
        self.sessions.get(upload_id).map(|s| Arc::clone(&s))
    }

    /// Record a part against a tracked upload.
    ///
    /// # Errors
    ///
    /// [`MultipartError::NoSuchUpload`] when the upload id is not tracked.
    pub fn record_part(&self, upload_id: &str, part: RecordedPart) -> Result<(), MultipartError> {
        let session = self
            .session(upload_id)
            .ok_or_else(|| MultipartError::NoSuchUpload(upload_id.to_owned()))?;
        session.record_part(part);
        Ok(())
    }

    /// Validate a submitted part list and return it sorted by ascending part
    /// number, ready for the backend.
    ///
    /// The session stays registered; it is consumed by [`Self::finish`] once
    /// the backend has acknowledged the completion, so a transient backend
    /// failure leaves the session intact for a retry.
    ///
    /// # Errors
    ///
    /// [`MultipartError::NoSuchUpload`] for an untracked id;
    /// [`MultipartError::InvalidPart`] when a submitted part number was never
    /// recorded or its ETag differs from the backend's.
    pub fn prepare_complete(
        &self,
        upload_id: &str,
        mut submitted: Vec<SubmittedPart>,
    ) -> Result<Vec<SubmittedPart>, MultipartError> {
        let session = self
            .session(upload_id)
            .ok_or_else(|| MultipartError::NoSuchUpload(upload_id.to_owned()))?;

        submitted.sort_by_key(|p| p.part_number);

        for part in &submitted {
            let recorded = session
                .part(part.part_number)
                .ok_or(MultipartError::InvalidPart(part.part_number))?;
            if trim_etag(&recorded.etag) != trim_etag(&part.etag) {
                return Err(MultipartError::InvalidPart(part.part_number));
            }
        }

        Ok(submitted)
    }

    /// Drop a completed session. Called after the backend acknowledged the
    /// CompleteMultipartUpload.
    pub fn finish(&self, upload_id: &str) {
        self.sessions.remove(upload_id);
    }

    /// Discard a session for an aborted upload.
    ///
    /// # Errors
    ///
    /// [`MultipartError::NoSuchUpload`] when the upload id is not tracked.
    pub fn abort(&self, upload_id: &str) -> Result<(), MultipartError> {
        self.sessions
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| MultipartError::NoSuchUpload(upload_id.to_owned()))
    }

    /// Number of in-flight sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop all sessions. Shutdown teardown.
    pub fn drain(&self) {
        self.sessions.clear();
    }
}

/// Compare ETags ignoring the surrounding quotes clients may or may not keep.
fn trim_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}
