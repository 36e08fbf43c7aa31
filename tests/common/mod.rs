// In-memory port implementations shared by the integration tests.
#![allow(dead_code)]

use std::{collections::HashMap, net::IpAddr, sync::Arc, sync::Mutex, time::Duration};

use async_trait::async_trait;
use axum::{Router, body::Body};
use bytes::Bytes;
use fanout::{
    adapters::HttpHandler,
    config::ForwardingConfig,
    core::FanOutService,
    ports::{
        http_client::{HttpClient, HttpClientError, HttpClientResult},
        resolver::{ResolutionResult, Resolver},
    },
};
use http_body_util::BodyExt;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};

/// Resolves names from a fixed table; unknown names resolve to nothing.
#[derive(Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn with(mut self, name: &str, addresses: &[&str]) -> Self {
        let ips = addresses
            .iter()
            .map(|a| a.parse().expect("test address"))
            .collect();
        self.entries.insert(name.to_string(), ips);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, service_name: &str) -> ResolutionResult<Vec<IpAddr>> {
        Ok(self.entries.get(service_name).cloned().unwrap_or_default())
    }
}

/// What a target would have received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Scripted reply for one target authority (`ip:port`).
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Status(u16),
    Delayed(u16, Duration),
    Refused,
}

/// Records every outbound request and answers from a per-authority script.
/// Unscripted authorities answer 200.
#[derive(Default)]
pub struct RecordingClient {
    script: HashMap<String, Reply>,
    recorded: Mutex<Vec<Recorded>>,
}

impl RecordingClient {
    pub fn reply(mut self, authority: &str, reply: Reply) -> Self {
        self.script.insert(authority.to_string(), reply);
        self
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for RecordingClient {
    async fn send_request(&self, req: Request<Body>) -> HttpClientResult<Response<Body>> {
        let (parts, body) = req.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| HttpClientError::ConnectionError(e.to_string()))?
            .to_bytes();
        let authority = parts
            .uri
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();
        self.recorded.lock().unwrap().push(Recorded {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body,
        });

        let status = match self.script.get(&authority).copied() {
            None => 200,
            Some(Reply::Status(status)) => status,
            Some(Reply::Delayed(status, delay)) => {
                tokio::time::sleep(delay).await;
                status
            }
            Some(Reply::Refused) => {
                return Err(HttpClientError::ConnectionError(format!(
                    "connection refused: {authority}"
                )));
            }
        };

        let mut response = Response::new(Body::from("ignored"));
        *response.status_mut() = StatusCode::from_u16(status).unwrap();
        Ok(response)
    }
}

/// Full router over the given fakes.
pub fn router(
    resolver: StaticResolver,
    client: Arc<RecordingClient>,
    forwarding: &ForwardingConfig,
) -> Router {
    let fanout = FanOutService::from_config(Arc::new(resolver), client, forwarding).unwrap();
    HttpHandler::new(
        Arc::new(fanout),
        "http",
        forwarding.request_timeout().unwrap(),
    )
    .router()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
