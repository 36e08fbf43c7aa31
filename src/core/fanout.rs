//! Fan-out orchestration for a single inbound request.
//!
//! `FanOutService` wires the pipeline together: resolve the service name,
//! capture the body once, replicate one request per address, dispatch them
//! concurrently and aggregate the outcomes. It holds no per-request state, so
//! one instance is shared by every connection.
use std::{sync::Arc, time::Instant};

use axum::body::Body as AxumBody;
use hyper::Request;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ForwardingConfig, ValidationResult},
    core::{
        aggregator::{AggregateResult, aggregate},
        body::{BodyCapturer, CaptureError},
        dispatcher::{Cancelled, Dispatcher},
        replicator::{CapturedRequest, RequestReplicator},
        resolution::resolve_addresses,
        target::ServiceTarget,
    },
    metrics,
    ports::{http_client::HttpClient, resolver::Resolver},
};

/// Errors that end the pipeline without an aggregate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FanOutError {
    /// The inbound request was cancelled; nothing should be emitted
    #[error("Fan-out cancelled")]
    Cancelled,

    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Failed to read request body: {0}")]
    BodyRead(String),
}

impl From<Cancelled> for FanOutError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<CaptureError> for FanOutError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Cancelled => Self::Cancelled,
            CaptureError::TooLarge { limit } => Self::BodyTooLarge { limit },
            CaptureError::Read(msg) => Self::BodyRead(msg),
        }
    }
}

/// What a completed pipeline produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The name resolved to nothing; answered with 404.
    NoAddresses,
    /// Every address was attempted.
    Aggregated(AggregateResult),
}

pub struct FanOutService {
    resolver: Arc<dyn Resolver>,
    client: Arc<dyn HttpClient>,
    capturer: BodyCapturer,
    replicator: RequestReplicator,
    dispatcher: Dispatcher,
}

impl FanOutService {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        client: Arc<dyn HttpClient>,
        capturer: BodyCapturer,
        replicator: RequestReplicator,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            resolver,
            client,
            capturer,
            replicator,
            dispatcher,
        }
    }

    /// Build the service from the `forwarding` section of the configuration.
    pub fn from_config(
        resolver: Arc<dyn Resolver>,
        client: Arc<dyn HttpClient>,
        config: &ForwardingConfig,
    ) -> ValidationResult<Self> {
        Ok(Self::new(
            resolver,
            client,
            BodyCapturer::new(config.max_body_bytes),
            RequestReplicator::new(config.excluded_header_names()?),
            Dispatcher::new(config.attempt_timeout()?, config.max_concurrent_attempts()),
        ))
    }

    /// Replay `request` against every address `target` resolves to.
    ///
    /// `path_suffix` is forwarded verbatim; `default_scheme` is used when the
    /// inbound request line has no scheme of its own.
    pub async fn forward(
        &self,
        target: &ServiceTarget,
        path_suffix: &str,
        request: Request<AxumBody>,
        default_scheme: &str,
        cancel: &CancellationToken,
    ) -> Result<ForwardOutcome, FanOutError> {
        let started = Instant::now();

        let addresses =
            resolve_addresses(self.resolver.as_ref(), target.service_name(), cancel).await;
        if cancel.is_cancelled() {
            return Err(FanOutError::Cancelled);
        }
        metrics::record_resolved_addresses(addresses.len());
        if addresses.is_empty() {
            return Ok(ForwardOutcome::NoAddresses);
        }

        let (parts, body) = request.into_parts();
        let body = self
            .capturer
            .capture(&parts.method, &parts.headers, body, cancel)
            .await?;
        let captured = CapturedRequest::from_parts(&parts, default_scheme, body);

        let attempts = addresses
            .iter()
            .map(|ip| {
                self.replicator
                    .build(&captured, *ip, target.port(), path_suffix)
            })
            .collect();

        let outcomes = self
            .dispatcher
            .dispatch_all(attempts, self.client.as_ref(), cancel)
            .await?;
        let result = aggregate(&outcomes);

        tracing::info!(
            service = %target,
            targets = outcomes.len(),
            all_succeeded = result.all_succeeded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fan-out completed"
        );

        Ok(ForwardOutcome::Aggregated(result))
    }
}
