//! Per-address request replication.
//!
//! A [`CapturedRequest`] is taken once per inbound request and is read-only
//! from then on. [`RequestReplicator::build`] turns it into one fresh outbound
//! request per resolved address.
use std::net::{IpAddr, SocketAddr};

use axum::body::Body as AxumBody;
use bytes::Bytes;
use hyper::{
    HeaderMap, Method, Request, Uri,
    header::{self, HeaderName, HeaderValue},
    http::request::Parts,
};
use thiserror::Error;

/// Errors raised while building an outbound request
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReplicateError {
    #[error("Invalid target URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Failed to build outbound request: {0}")]
    Build(String),
}

/// Where a copied header lands on the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderPlacement {
    /// Protocol level header, always forwarded.
    Request,
    /// Describes the payload; only forwarded when a body is attached.
    Content,
}

/// Headers describing the payload rather than the request itself.
const CONTENT_HEADERS: [HeaderName; 11] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_ENCODING,
    header::CONTENT_LANGUAGE,
    header::CONTENT_LOCATION,
    header::CONTENT_RANGE,
    header::CONTENT_DISPOSITION,
    header::EXPIRES,
    header::LAST_MODIFIED,
    header::ALLOW,
    header::TRANSFER_ENCODING,
];

/// Classify a header for the two-tier placement policy.
pub fn placement_for(name: &HeaderName) -> HeaderPlacement {
    if CONTENT_HEADERS.contains(name) || name.as_str() == "content-md5" {
        HeaderPlacement::Content
    } else {
        HeaderPlacement::Request
    }
}

/// Immutable snapshot of everything needed to replay an inbound request.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    method: Method,
    scheme: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl CapturedRequest {
    pub fn new(
        method: Method,
        scheme: impl Into<String>,
        query: Option<String>,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Self {
        Self {
            method,
            scheme: scheme.into(),
            query,
            headers,
            body,
        }
    }

    /// Snapshot the inbound request head. `default_scheme` is used when the
    /// request line carries no scheme (origin-form).
    pub fn from_parts(parts: &Parts, default_scheme: &str, body: Option<Bytes>) -> Self {
        Self::new(
            parts.method.clone(),
            parts.uri.scheme_str().unwrap_or(default_scheme),
            parts.uri.query().map(str::to_string),
            parts.headers.clone(),
            body,
        )
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// Builds outbound requests from a [`CapturedRequest`], dropping a fixed set
/// of excluded headers. `Host` is always excluded.
#[derive(Debug, Clone)]
pub struct RequestReplicator {
    excluded_headers: Vec<HeaderName>,
}

impl Default for RequestReplicator {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl RequestReplicator {
    pub fn new(excluded: impl IntoIterator<Item = HeaderName>) -> Self {
        let mut excluded_headers = vec![header::HOST];
        for name in excluded {
            if !excluded_headers.contains(&name) {
                excluded_headers.push(name);
            }
        }
        Self { excluded_headers }
    }

    pub fn is_excluded(&self, name: &HeaderName) -> bool {
        self.excluded_headers.contains(name)
    }

    /// Absolute URI of the attempt against `host:port`.
    pub fn target_uri(
        captured: &CapturedRequest,
        host: IpAddr,
        port: u16,
        path_suffix: &str,
    ) -> Result<Uri, ReplicateError> {
        let authority = SocketAddr::new(host, port);
        let mut uri = format!("{}://{}{}", captured.scheme, authority, path_suffix);
        if let Some(query) = &captured.query {
            uri.push('?');
            uri.push_str(query);
        }

        uri.parse::<Uri>()
            .map_err(|e| ReplicateError::InvalidUri {
                reason: e.to_string(),
                uri,
            })
    }

    /// Build the outbound request for one resolved address.
    pub fn build(
        &self,
        captured: &CapturedRequest,
        host: IpAddr,
        port: u16,
        path_suffix: &str,
    ) -> Result<Request<AxumBody>, ReplicateError> {
        let uri = Self::target_uri(captured, host, port, path_suffix)?;
        let authority = SocketAddr::new(host, port).to_string();
        let host_value = HeaderValue::from_str(&authority)
            .map_err(|e| ReplicateError::Build(format!("host header '{authority}': {e}")))?;

        let mut headers = HeaderMap::with_capacity(captured.headers.len() + 1);
        headers.insert(header::HOST, host_value);

        for (name, value) in &captured.headers {
            if self.is_excluded(name) {
                continue;
            }
            match placement_for(name) {
                HeaderPlacement::Request => {
                    headers.append(name.clone(), value.clone());
                }
                HeaderPlacement::Content if captured.body.is_some() => {
                    headers.append(name.clone(), value.clone());
                }
                HeaderPlacement::Content => {}
            }
        }

        let body = captured
            .body
            .clone()
            .map_or_else(AxumBody::empty, AxumBody::from);

        let mut request = Request::builder()
            .method(captured.method.clone())
            .uri(uri)
            .body(body)
            .map_err(|e| ReplicateError::Build(e.to_string()))?;
        *request.headers_mut() = headers;

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    fn captured(
        method: Method,
        query: Option<&str>,
        pairs: &[(&'static str, &'static str)],
        body: Option<&'static [u8]>,
    ) -> CapturedRequest {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, HeaderValue::from_static(value));
        }
        CapturedRequest::new(
            method,
            "http",
            query.map(str::to_string),
            headers,
            body.map(Bytes::from_static),
        )
    }

    #[test]
    fn test_placement_policy() {
        assert_eq!(placement_for(&header::CONTENT_TYPE), HeaderPlacement::Content);
        assert_eq!(placement_for(&header::CONTENT_LENGTH), HeaderPlacement::Content);
        assert_eq!(
            placement_for(&HeaderName::from_static("content-md5")),
            HeaderPlacement::Content
        );
        assert_eq!(placement_for(&header::ACCEPT), HeaderPlacement::Request);
        assert_eq!(placement_for(&header::AUTHORIZATION), HeaderPlacement::Request);
        assert_eq!(
            placement_for(&HeaderName::from_static("x-custom")),
            HeaderPlacement::Request
        );
    }

    #[test]
    fn test_target_uri_keeps_query_verbatim() {
        let req = captured(Method::GET, Some("a=1&b=%20x&a=2"), &[], None);
        let uri = RequestReplicator::target_uri(&req, "10.0.0.1".parse().unwrap(), 8080, "/status")
            .unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.1:8080/status?a=1&b=%20x&a=2");
    }

    #[test]
    fn test_target_uri_brackets_ipv6() {
        let req = captured(Method::GET, None, &[], None);
        let uri =
            RequestReplicator::target_uri(&req, "fd00::1".parse().unwrap(), 80, "/").unwrap();
        assert_eq!(uri.to_string(), "http://[fd00::1]:80/");
    }

    #[test]
    fn test_build_overrides_host_and_keeps_multi_values() {
        let req = captured(
            Method::GET,
            None,
            &[
                ("host", "proxy.internal"),
                ("accept", "text/plain"),
                ("x-trace", "one"),
                ("x-trace", "two"),
            ],
            None,
        );
        let out = RequestReplicator::default()
            .build(&req, "10.0.0.2".parse().unwrap(), 9000, "/x")
            .unwrap();

        assert_eq!(out.method(), Method::GET);
        assert_eq!(out.headers().get(header::HOST).unwrap(), "10.0.0.2:9000");
        assert_eq!(out.headers().get_all(header::HOST).iter().count(), 1);
        assert_eq!(out.headers().get(header::ACCEPT).unwrap(), "text/plain");
        let traces: Vec<_> = out.headers().get_all("x-trace").iter().collect();
        assert_eq!(traces, vec!["one", "two"]);
    }

    #[test]
    fn test_content_headers_dropped_without_body() {
        let req = captured(
            Method::GET,
            None,
            &[("content-type", "application/json"), ("content-length", "5")],
            None,
        );
        let out = RequestReplicator::default()
            .build(&req, "10.0.0.1".parse().unwrap(), 80, "/")
            .unwrap();
        assert!(!out.headers().contains_key(header::CONTENT_TYPE));
        assert!(!out.headers().contains_key(header::CONTENT_LENGTH));
    }

    #[tokio::test]
    async fn test_build_attaches_body_and_content_headers() {
        let req = captured(
            Method::PUT,
            None,
            &[("content-type", "application/json"), ("content-length", "7")],
            Some(b"{\"a\":1}"),
        );
        let out = RequestReplicator::default()
            .build(&req, "10.0.0.1".parse().unwrap(), 80, "/cfg")
            .unwrap();
        assert_eq!(out.method(), Method::PUT);
        assert_eq!(
            out.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = out.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"{\"a\":1}");
    }

    #[test]
    fn test_configured_exclusions_apply() {
        let req = captured(
            Method::GET,
            None,
            &[("x-secret", "s3cr3t"), ("accept", "*/*")],
            None,
        );
        let replicator = RequestReplicator::new([HeaderName::from_static("x-secret")]);
        assert!(replicator.is_excluded(&header::HOST));
        let out = replicator
            .build(&req, "10.0.0.1".parse().unwrap(), 80, "/")
            .unwrap();
        assert!(!out.headers().contains_key("x-secret"));
        assert!(out.headers().contains_key(header::ACCEPT));
    }

    #[test]
    fn test_captured_request_is_not_mutated() {
        let req = captured(Method::GET, None, &[("host", "original")], None);
        let replicator = RequestReplicator::default();
        for last in 1..=3u8 {
            let ip = IpAddr::from([10, 0, 0, last]);
            replicator.build(&req, ip, 80, "/").unwrap();
        }
        assert_eq!(req.headers().get(header::HOST).unwrap(), "original");
    }
}
