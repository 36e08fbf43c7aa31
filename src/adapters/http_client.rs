use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// Shared outbound client for fan-out attempts: hyper-util's pooled client over
/// a rustls connector trusting the platform roots.
///
/// Targets are addressed by IP, so requests always go out as HTTP/1.1 with the
/// `Host` header the replicator chose. Nothing is added to the request and the
/// response is handed back as soon as its head arrives, body unread.
#[derive(Clone)]
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

/// Idle keep-alive connections are dropped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

impl HttpClientAdapter {
    pub fn new() -> Result<Self> {
        // Another component may already have installed a provider
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_nodelay(true);

        let tls = rustls::ClientConfig::builder()
            .with_root_certificates(native_root_store())
            .with_no_client_auth();
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build::<_, AxumBody>(connector);

        tracing::info!("Created shared HTTP client for fan-out attempts");
        Ok(Self { client })
    }
}

fn native_root_store() -> rustls::RootCertStore {
    let loaded = load_native_certs();
    if !loaded.errors.is_empty() {
        tracing::warn!("Some native certificates failed to load: {:?}", loaded.errors);
    }

    let mut store = rustls::RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(loaded.certs);
    if ignored > 0 {
        tracing::warn!("Ignored {} unparsable native root certificates", ignored);
    }
    tracing::debug!("Trusting {} native root certificates", added);
    store
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        if req.uri().host().is_none() {
            return Err(HttpClientError::InvalidRequest(format!(
                "outbound URI {} has no host",
                req.uri()
            )));
        }

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let target = format!("{} {}", parts.method, parts.uri);
        tracing::trace!(headers = ?parts.headers, "Sending {}", target);

        let response = self
            .client
            .request(Request::from_parts(parts, body))
            .await
            .map_err(|e| {
                tracing::debug!("{} failed: {:?}", target, e);
                HttpClientError::ConnectionError(format!("{target} failed: {e}"))
            })?;

        let (mut head, incoming) = response.into_parts();
        // Framing belongs to the hyper connection, not to the caller.
        head.headers.remove(header::TRANSFER_ENCODING);
        Ok(Response::from_parts(head, AxumBody::new(incoming)))
    }
}
