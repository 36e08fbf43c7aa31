//! Concurrent dispatch of replicated requests.
//!
//! Every attempt yields exactly one [`AttemptOutcome`]. Transport failures are
//! converted into failure outcomes so one bad target never aborts its
//! siblings; only cancellation of the inbound request ends the dispatch early.
use std::{num::NonZeroUsize, time::Duration};

use futures_util::{StreamExt, stream};
use hyper::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    core::replicator::ReplicateError,
    metrics,
    ports::http_client::{HttpClient, HttpClientError},
};

/// The inbound request was cancelled before every attempt completed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Dispatch cancelled")]
pub struct Cancelled;

/// Why an attempt produced no response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {}", humantime::format_duration(*.0))]
    TimedOut(Duration),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AttemptError {
    /// Status reported for the failed target in the aggregate payload.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Transport(_) | Self::InvalidRequest(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<HttpClientError> for AttemptError {
    fn from(err: HttpClientError) -> Self {
        match err {
            HttpClientError::Timeout(limit) => Self::TimedOut(limit),
            HttpClientError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Result of one outbound attempt. `address` is the effective request URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Completed {
        address: String,
        status: StatusCode,
    },
    Failed {
        address: Option<String>,
        error: AttemptError,
    },
}

impl AttemptOutcome {
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Completed { address, .. } => Some(address),
            Self::Failed { address, .. } => address.as_deref(),
        }
    }

    /// Reported status: the target's own, or a synthesized one on failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Completed { status, .. } => *status,
            Self::Failed { error, .. } => error.status_code(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { status, .. } if status.is_success())
    }
}

/// An outbound request ready for dispatch, or the reason it could not be built.
pub type PendingAttempt = Result<hyper::Request<axum::body::Body>, ReplicateError>;

/// Issues attempts concurrently over a shared client and waits for all of them.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    attempt_timeout: Option<Duration>,
    max_concurrent_attempts: Option<NonZeroUsize>,
}

impl Dispatcher {
    pub fn new(
        attempt_timeout: Option<Duration>,
        max_concurrent_attempts: Option<NonZeroUsize>,
    ) -> Self {
        Self {
            attempt_timeout,
            max_concurrent_attempts,
        }
    }

    /// Run every attempt and return their outcomes in input order.
    ///
    /// At most `max_concurrent_attempts` requests are in flight at once when a
    /// bound is configured; no attempt is ever skipped.
    pub async fn dispatch_all(
        &self,
        attempts: Vec<PendingAttempt>,
        client: &dyn HttpClient,
        cancel: &CancellationToken,
    ) -> Result<Vec<AttemptOutcome>, Cancelled> {
        let width = self
            .max_concurrent_attempts
            .map_or(attempts.len(), NonZeroUsize::get)
            .max(1);

        let all = stream::iter(attempts)
            .map(|attempt| self.run_attempt(attempt, client))
            .buffered(width)
            .collect::<Vec<_>>();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Inbound request cancelled, dropping in-flight attempts");
                Err(Cancelled)
            }
            outcomes = all => Ok(outcomes),
        }
    }

    async fn run_attempt(&self, attempt: PendingAttempt, client: &dyn HttpClient) -> AttemptOutcome {
        let request = match attempt {
            Ok(request) => request,
            Err(e) => {
                tracing::error!("Could not build outbound request: {}", e);
                metrics::increment_attempt_total("invalid");
                return AttemptOutcome::Failed {
                    address: None,
                    error: AttemptError::InvalidRequest(e.to_string()),
                };
            }
        };

        let address = request.uri().to_string();
        let span = tracing::info_span!(
            "backend_request",
            backend.url = %address,
            http.method = %request.method(),
            http.status_code = tracing::field::Empty,
        );

        async move {
            let _timer = metrics::AttemptTimer::new();
            let sent = match self.attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, client.send_request(request))
                    .await
                    .unwrap_or(Err(HttpClientError::Timeout(limit))),
                None => client.send_request(request).await,
            };

            match sent {
                Ok(response) => {
                    let status = response.status();
                    tracing::Span::current().record("http.status_code", status.as_u16());
                    tracing::debug!("Target answered {}", status);
                    metrics::increment_attempt_total(if status.is_success() {
                        "success"
                    } else {
                        "error_status"
                    });
                    // Only the head is needed; the body is dropped unread.
                    drop(response);
                    AttemptOutcome::Completed { address, status }
                }
                Err(e) => {
                    let error = AttemptError::from(e);
                    tracing::Span::current()
                        .record("http.status_code", error.status_code().as_u16());
                    tracing::warn!("Attempt failed: {}", error);
                    metrics::increment_attempt_total(match error {
                        AttemptError::TimedOut(_) => "timeout",
                        _ => "transport_error",
                    });
                    AttemptOutcome::Failed {
                        address: Some(address),
                        error,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        time::Instant,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use axum::body::Body as AxumBody;
    use hyper::{Request, Response};

    use super::*;
    use crate::ports::http_client::HttpClientResult;

    /// Answers per host: a status after a delay, or a connection error.
    struct ScriptedClient {
        script: HashMap<String, (Option<u16>, Duration)>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(entries: &[(&str, Option<u16>, u64)]) -> Self {
            Self {
                script: entries
                    .iter()
                    .map(|(host, status, delay)| {
                        (host.to_string(), (*status, Duration::from_millis(*delay)))
                    })
                    .collect(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send_request(
            &self,
            req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            let host = req.uri().host().unwrap_or_default().to_string();
            let (status, delay) = self
                .script
                .get(&host)
                .cloned()
                .unwrap_or((None, Duration::ZERO));

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match status {
                Some(code) => Ok(Response::builder()
                    .status(code)
                    .body(AxumBody::empty())
                    .unwrap()),
                None => Err(HttpClientError::ConnectionError(format!(
                    "connection refused by {host}"
                ))),
            }
        }
    }

    fn attempt(host: &str) -> PendingAttempt {
        Ok(Request::builder()
            .uri(format!("http://{host}:8080/status"))
            .body(AxumBody::empty())
            .unwrap())
    }

    #[tokio::test]
    async fn test_outcomes_follow_input_order() {
        // The first target is the slowest so completion order is reversed.
        let client = ScriptedClient::new(&[
            ("10.0.0.1", Some(200), 60),
            ("10.0.0.2", Some(503), 30),
            ("10.0.0.3", Some(204), 0),
        ]);
        let outcomes = Dispatcher::default()
            .dispatch_all(
                vec![attempt("10.0.0.1"), attempt("10.0.0.2"), attempt("10.0.0.3")],
                &client,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let statuses: Vec<u16> = outcomes.iter().map(|o| o.status_code().as_u16()).collect();
        assert_eq!(statuses, vec![200, 503, 204]);
        assert_eq!(outcomes[0].address(), Some("http://10.0.0.1:8080/status"));
        assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transport_error_does_not_abort_siblings() {
        let client = ScriptedClient::new(&[("10.0.0.1", Some(200), 10), ("10.0.0.2", None, 0)]);
        let outcomes = Dispatcher::default()
            .dispatch_all(
                vec![attempt("10.0.0.1"), attempt("10.0.0.2")],
                &client,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_success());
        assert!(matches!(
            &outcomes[1],
            AttemptOutcome::Failed { address: Some(a), error: AttemptError::Transport(_) }
                if a == "http://10.0.0.2:8080/status"
        ));
        assert_eq!(outcomes[1].status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_attempt_timeout_becomes_failure() {
        let client = ScriptedClient::new(&[("10.0.0.1", Some(200), 5_000), ("10.0.0.2", Some(200), 0)]);
        let outcomes = Dispatcher::new(Some(Duration::from_millis(50)), None)
            .dispatch_all(
                vec![attempt("10.0.0.1"), attempt("10.0.0.2")],
                &client,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcomes[0].status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(!outcomes[0].is_success());
        assert!(outcomes[1].is_success());
    }

    #[tokio::test]
    async fn test_concurrency_bound_keeps_every_attempt() {
        let hosts = ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"];
        let entries: Vec<_> = hosts.iter().map(|h| (*h, Some(200), 20)).collect();
        let client = ScriptedClient::new(&entries);
        let outcomes = Dispatcher::new(None, NonZeroUsize::new(2))
            .dispatch_all(
                hosts.iter().map(|h| attempt(h)).collect(),
                &client,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), hosts.len());
        assert!(outcomes.iter().all(AttemptOutcome::is_success));
        assert!(client.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_unbuildable_request_has_no_address() {
        let client = ScriptedClient::new(&[]);
        let outcomes = Dispatcher::default()
            .dispatch_all(
                vec![Err(ReplicateError::Build("bad header".to_string()))],
                &client,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcomes[0].address(), None);
        assert_eq!(outcomes[0].status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_cancellation_stops_dispatch() {
        let client = Arc::new(ScriptedClient::new(&[("10.0.0.1", Some(200), 10_000)]));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = Dispatcher::default()
            .dispatch_all(vec![attempt("10.0.0.1")], client.as_ref(), &cancel)
            .await;
        assert_eq!(result, Err(Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
