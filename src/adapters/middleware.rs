//! Axum middleware attached to the fan-out router.
//!
//! Both layers are stateless: one opens the per-request tracing span and
//! exposes its id, the other logs and measures each request inside that span.
use std::time::Instant;

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;

use crate::{metrics::RequestTimer, tracing_setup::create_request_span};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generate a per-request UUID, open the `request` span with it and expose it
/// via `X-Request-ID`.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = create_request_span(req.method().as_str(), req.uri().path(), &request_id);

    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

/// Log start/end of a request including latency.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let _timer = RequestTimer::new();
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    tracing::debug!("Started processing {} {}", method, uri);

    let response = next.run(req).await;

    tracing::Span::current().record("http.status_code", response.status().as_u16());
    tracing::info!(
        "Completed {} {} - {} in {:?}",
        method,
        uri,
        response.status(),
        start.elapsed()
    );

    response
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{HeaderValue, StatusCode},
        middleware,
        routing::get,
    };
    use tower::ServiceExt; // for oneshot

    use super::*;

    #[tokio::test]
    async fn test_request_id_middleware() {
        let app = Router::new()
            .route(
                "/",
                get(|| async {
                    axum::response::Response::builder()
                        .status(StatusCode::OK)
                        .body(Body::empty())
                        .unwrap()
                }),
            )
            .layer(middleware::from_fn(request_id_middleware));

        let response = app
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let headers = response.headers();

        let request_id = headers.get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(request_id).is_ok());
    }

    #[tokio::test]
    async fn test_request_timing_middleware_passes_response_through() {
        let app = Router::new()
            .route(
                "/",
                get(|| async {
                    axum::response::Response::builder()
                        .status(StatusCode::ACCEPTED)
                        .header("x-probe", "1")
                        .body(Body::empty())
                        .unwrap()
                }),
            )
            .layer(middleware::from_fn(request_timing_middleware));

        let response = app
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            response.headers().get("x-probe").unwrap(),
            HeaderValue::from_static("1")
        );
    }
}
