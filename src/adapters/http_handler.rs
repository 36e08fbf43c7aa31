use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::Request,
    http::{StatusCode, header},
    middleware,
    response::Response,
    routing::any,
};
use eyre::{Result, WrapErr};
use tokio_util::sync::CancellationToken;

use crate::{
    adapters::middleware::{request_id_middleware, request_timing_middleware},
    core::{FanOutError, FanOutService, ForwardOutcome, ServiceTarget},
    metrics,
};

/// Inbound HTTP adapter: maps `/{service_name}/{target_port}/{*rest}` onto the
/// fan-out pipeline and its outcome onto an HTTP response.
#[derive(Clone)]
pub struct HttpHandler {
    fanout: Arc<FanOutService>,
    scheme: &'static str,
    request_timeout: Option<Duration>,
}

impl HttpHandler {
    /// `scheme` is the listener's own scheme, used for origin-form requests.
    pub fn new(
        fanout: Arc<FanOutService>,
        scheme: &'static str,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            fanout,
            scheme,
            request_timeout,
        }
    }

    /// Axum router serving every path through [`HttpHandler::handle_request`].
    pub fn router(self) -> Router {
        let handler = Arc::new(self);
        Router::new()
            .route(
                "/{*path}",
                any(move |req: Request| {
                    let handler = handler.clone();
                    async move {
                        match handler.handle_request(req).await {
                            Ok(response) => Ok::<Response<AxumBody>, Infallible>(response),
                            Err(e) => {
                                tracing::error!("Request handling error: {:?}", e);
                                Ok(empty_response(StatusCode::INTERNAL_SERVER_ERROR))
                            }
                        }
                    }
                }),
            )
            .layer(middleware::from_fn(request_timing_middleware))
            .layer(middleware::from_fn(request_id_middleware))
    }

    /// Run the fan-out for one inbound request.
    ///
    /// The pipeline shares one cancellation token. It fires when this future is
    /// dropped (the client went away) or when the configured request timeout
    /// elapses.
    pub async fn handle_request(&self, req: Request) -> Result<Response<AxumBody>> {
        let (target, path_suffix) = match ServiceTarget::parse_route(req.uri().path()) {
            Ok(route) => route,
            Err(e) => {
                tracing::debug!("Path {} is not a fan-out route: {}", req.uri().path(), e);
                metrics::increment_request_total("rejected");
                return Ok(empty_response(StatusCode::NOT_FOUND));
            }
        };

        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();
        if let Some(limit) = self.request_timeout {
            let deadline = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        tracing::warn!("Request deadline of {:?} reached, cancelling fan-out", limit);
                        deadline.cancel();
                    }
                    _ = deadline.cancelled() => {}
                }
            });
        }

        let result = self
            .fanout
            .forward(&target, &path_suffix, req, self.scheme, &cancel)
            .await;

        match result {
            Ok(ForwardOutcome::NoAddresses) => {
                metrics::increment_request_total("not_found");
                Ok(empty_response(StatusCode::NOT_FOUND))
            }
            Ok(ForwardOutcome::Aggregated(aggregate)) => {
                let status = aggregate.verdict();
                metrics::increment_request_total(if aggregate.all_succeeded {
                    "ok"
                } else {
                    "failed"
                });
                let body = serde_json::to_vec(&aggregate)
                    .wrap_err("Failed to serialize aggregate result")?;
                Response::builder()
                    .status(status)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(AxumBody::from(body))
                    .wrap_err("Failed to build aggregate response")
            }
            Err(FanOutError::Cancelled) => {
                // A disconnected client never sees this; only the deadline gets here.
                metrics::increment_request_total("cancelled");
                Ok(empty_response(StatusCode::GATEWAY_TIMEOUT))
            }
            Err(e @ FanOutError::BodyTooLarge { .. }) => {
                tracing::warn!("Rejecting request: {}", e);
                metrics::increment_request_total("rejected");
                Ok(empty_response(StatusCode::PAYLOAD_TOO_LARGE))
            }
            Err(e) => {
                tracing::warn!("Rejecting request: {}", e);
                metrics::increment_request_total("rejected");
                Ok(empty_response(StatusCode::BAD_REQUEST))
            }
        }
    }
}

fn empty_response(status: StatusCode) -> Response<AxumBody> {
    let mut response = Response::new(AxumBody::empty());
    *response.status_mut() = status;
    response
}
