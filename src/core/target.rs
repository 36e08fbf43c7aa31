//! Route parsing for `/{service_name}/{target_port}/{*rest}`.
//!
//! The path is split on the raw (still percent-encoded) form so the forwarded
//! suffix reaches every target exactly as the caller sent it.
use std::fmt;

use thiserror::Error;

/// Errors produced when an inbound path does not address a service target
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouteError {
    #[error("Missing service name segment")]
    MissingServiceName,

    #[error("Missing target port segment")]
    MissingPort,

    #[error("Invalid target port '{0}'")]
    InvalidPort(String),
}

/// Logical destination of a fan-out: a resolvable name plus the port every
/// resolved address is contacted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceTarget {
    service_name: String,
    port: u16,
}

impl ServiceTarget {
    pub fn new(service_name: impl Into<String>, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            port,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Split an inbound request path into its target and the suffix forwarded
    /// to every address.
    ///
    /// `/cache/8080/status` yields (`cache`, `8080`) and `/status`;
    /// `/cache/8080` and `/cache/8080/` both forward `/`.
    pub fn parse_route(path: &str) -> Result<(Self, String), RouteError> {
        let mut segments = path.trim_start_matches('/').splitn(3, '/');

        let service_name = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(RouteError::MissingServiceName)?;
        let port_segment = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(RouteError::MissingPort)?;
        let port = parse_port(port_segment)?;
        let path_suffix = format!("/{}", segments.next().unwrap_or_default());

        Ok((Self::new(service_name, port), path_suffix))
    }
}

impl fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service_name, self.port)
    }
}

// `u16::from_str` accepts a leading '+', which is not a valid route segment.
fn parse_port(segment: &str) -> Result<u16, RouteError> {
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RouteError::InvalidPort(segment.to_string()));
    }
    segment
        .parse()
        .map_err(|_| RouteError::InvalidPort(segment.to_string()))
}
