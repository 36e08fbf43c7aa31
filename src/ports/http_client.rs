use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to a target fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when the attempt exceeded its time budget
    #[error("Timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for sending one outbound request.
///
/// Implementations must be safe to share between concurrent attempts without
/// external locking.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to a target
    ///
    /// # Arguments
    /// * `req` - The fully built outbound request (absolute URI)
    ///
    /// # Returns
    /// The target's response as soon as its headers are available. The body is
    /// left unread.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
