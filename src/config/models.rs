//! Configuration data structures for fanout.
//!
//! These types map directly to YAML (also TOML / JSON) configuration files and
//! `FANOUT__*` environment overrides. Every section has defaults so an empty
//! file is a valid configuration.
use std::{num::NonZeroUsize, time::Duration};

use hyper::header::HeaderName;
use serde::{Deserialize, Serialize};

use crate::config::validation::{ValidationError, ValidationResult};

/// Default cap on a captured request body (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_excluded_headers() -> Vec<String> {
    vec!["host".to_string()]
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Scheme of the inbound listener, used for origin-form requests.
    pub fn listener_scheme(&self) -> &'static str {
        if self.tls.is_some() { "https" } else { "http" }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            tls: None,
            forwarding: ForwardingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Builder for ServerConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ServerConfigBuilder {
    listen_addr: Option<String>,
    tls: Option<TlsConfig>,
    forwarding: Option<ForwardingConfig>,
    logging: Option<LoggingConfig>,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Serve over TLS with a PEM certificate chain and PKCS#8 key
    pub fn tls(mut self, cert_path: impl Into<String>, key_path: impl Into<String>) -> Self {
        self.tls = Some(TlsConfig {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        });
        self
    }

    pub fn forwarding(mut self, config: ForwardingConfig) -> Self {
        self.forwarding = Some(config);
        self
    }

    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            tls: self.tls,
            forwarding: self.forwarding.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        }
    }
}

/// TLS configuration for the inbound listener.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TlsConfig {
    /// Path to PEM encoded certificate chain
    pub cert_path: String,
    /// Path to PEM encoded PKCS#8 private key
    pub key_path: String,
}

/// How inbound requests are replayed against resolved addresses.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Inbound headers never copied to targets. `host` is always excluded.
    pub excluded_headers: Vec<String>,
    /// Largest inbound body that will be buffered for replay
    pub max_body_bytes: usize,
    /// Upper bound on simultaneously in-flight attempts per request (unbounded when unset)
    pub max_concurrent_attempts: Option<usize>,
    /// Per-attempt time budget, e.g. "5s" or "750ms"
    pub attempt_timeout: Option<String>,
    /// Whole-request deadline after which the pipeline is cancelled
    pub request_timeout: Option<String>,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            excluded_headers: default_excluded_headers(),
            max_body_bytes: default_max_body_bytes(),
            max_concurrent_attempts: None,
            attempt_timeout: None,
            request_timeout: None,
        }
    }
}

impl ForwardingConfig {
    pub fn attempt_timeout(&self) -> ValidationResult<Option<Duration>> {
        parse_duration_field("forwarding.attempt_timeout", self.attempt_timeout.as_deref())
    }

    pub fn request_timeout(&self) -> ValidationResult<Option<Duration>> {
        parse_duration_field("forwarding.request_timeout", self.request_timeout.as_deref())
    }

    /// Zero is rejected by validation and treated as unbounded here.
    pub fn max_concurrent_attempts(&self) -> Option<NonZeroUsize> {
        self.max_concurrent_attempts.and_then(NonZeroUsize::new)
    }

    pub fn excluded_header_names(&self) -> ValidationResult<Vec<HeaderName>> {
        self.excluded_headers
            .iter()
            .map(|name| {
                HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| {
                    ValidationError::InvalidField {
                        field: "forwarding.excluded_headers".to_string(),
                        message: format!("'{name}' is not a valid header name: {e}"),
                    }
                })
            })
            .collect()
    }
}

/// Logging output settings. `RUST_LOG`, when set, takes precedence over `level`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

fn parse_duration_field(field: &str, value: Option<&str>) -> ValidationResult<Option<Duration>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let duration =
        humantime::parse_duration(raw.trim()).map_err(|e| ValidationError::InvalidField {
            field: field.to_string(),
            message: format!("'{raw}' is not a valid duration: {e}"),
        })?;
    if duration.is_zero() {
        return Err(ValidationError::InvalidField {
            field: field.to_string(),
            message: "duration must be greater than zero".to_string(),
        });
    }
    Ok(Some(duration))
}
