//! Inbound body capture.
//!
//! The body has to be replayed to every resolved address, so it is read once
//! into a single contiguous buffer. Requests that cannot carry a meaningful
//! body skip buffering entirely.
use axum::body::Body as AxumBody;
use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::{HeaderMap, Method, header};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Methods whose request body carries no defined semantics.
const BODYLESS_METHODS: [Method; 5] = [
    Method::GET,
    Method::HEAD,
    Method::DELETE,
    Method::CONNECT,
    Method::TRACE,
];

/// Errors raised while draining the inbound body
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CaptureError {
    /// The inbound request was cancelled mid-read
    #[error("Body capture cancelled")]
    Cancelled,

    /// The body exceeded the configured limit
    #[error("Request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// Reading from the inbound stream failed
    #[error("Failed to read request body: {0}")]
    Read(String),
}

/// Returns true when the headers signal a body: a non-zero `Content-Length`
/// or any `Transfer-Encoding`.
pub fn body_signaled(headers: &HeaderMap) -> bool {
    let has_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .is_some_and(|len| len > 0);

    has_length || headers.contains_key(header::TRANSFER_ENCODING)
}

/// Returns true when a body should be captured for this method and headers.
pub fn expects_body(method: &Method, headers: &HeaderMap) -> bool {
    body_signaled(headers) && !BODYLESS_METHODS.contains(method)
}

/// Reads inbound request bodies into memory, at most `max_body_bytes` each.
#[derive(Debug, Clone)]
pub struct BodyCapturer {
    max_body_bytes: usize,
}

impl BodyCapturer {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Drain `body` into a buffer, or return `None` when no body applies.
    ///
    /// Frames are accumulated until end-of-stream. Cancellation aborts the read
    /// and never yields a partial buffer.
    pub async fn capture(
        &self,
        method: &Method,
        headers: &HeaderMap,
        mut body: AxumBody,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, CaptureError> {
        if !expects_body(method, headers) {
            return Ok(None);
        }

        let hint = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0)
            .min(self.max_body_bytes);
        let mut buffer = BytesMut::with_capacity(hint);

        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CaptureError::Cancelled),
                frame = body.frame() => frame,
            };

            match frame {
                None => break,
                Some(Err(e)) => return Err(CaptureError::Read(e.to_string())),
                Some(Ok(frame)) => {
                    // Trailers are not replayed.
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    if buffer.len() + data.len() > self.max_body_bytes {
                        return Err(CaptureError::TooLarge {
                            limit: self.max_body_bytes,
                        });
                    }
                    buffer.extend_from_slice(&data);
                }
            }
        }

        tracing::debug!(bytes = buffer.len(), "Captured request body");
        Ok(Some(buffer.freeze()))
    }
}
