//! Response body type supporting buffered, empty, and streaming modes.
//!
//! Error bodies and rewritten multipart XML are buffered; everything relayed
//! from the storage backend streams chunk by chunk so large objects never sit
//! in proxy memory.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http_body_util::{Full, StreamBody};

/// A streamed body chunk source, boxed so the variant has a single type.
type BoxedStreaming = Pin<Box<dyn http_body::Body<Data = Bytes, Error = std::io::Error> + Send>>;

/// Response body for the proxy.
///
/// Implements [`http_body::Body`] so it can be used directly with hyper
/// responses.
#[derive(Default)]
pub enum ProxyBody {
    /// Buffered body for error XML and rewritten payloads.
    Buffered(Full<Bytes>),
    /// Empty body for 204 responses and HEAD responses.
    #[default]
    Empty,
    /// Chunked relay of a backend response body.
    Streaming(BoxedStreaming),
}

impl std::fmt::Debug for ProxyBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(full) => f.debug_tuple("Buffered").field(full).finish(),
            Self::Empty => f.write_str("Empty"),
            Self::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

impl ProxyBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Create a streaming body from a chunk stream.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let frames = stream
            .map_ok(http_body::Frame::data)
            .map_err(std::io::Error::other);
        Self::Streaming(Box::pin(StreamBody::new(frames)))
    }
}

impl http_body::Body for ProxyBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Empty => Poll::Ready(None),
            Self::Streaming(inner) => inner.as_mut().poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Empty => true,
            Self::Streaming(inner) => inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Empty => http_body::SizeHint::with_exact(0),
            Self::Streaming(inner) => inner.size_hint(),
        }
    }
}
