#![allow(clippy::collapsible_if)]

use std::{net::SocketAddr, path::Path};

use crate::config::models::{ForwardingConfig, LoggingConfig, ServerConfig, TlsConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid TLS configuration: {message}")]
    InvalidTls { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem at once
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Some(tls_config) = &config.tls {
            if let Err(e) = Self::validate_tls_config(tls_config) {
                errors.push(e);
            }
        }

        errors.extend(Self::validate_forwarding(&config.forwarding));

        if let Err(e) = Self::validate_logging(&config.logging) {
            errors.push(e);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            }),
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_tls_config(tls: &TlsConfig) -> ValidationResult<()> {
        for (label, path) in [("certificate", &tls.cert_path), ("private key", &tls.key_path)] {
            if path.trim().is_empty() {
                return Err(ValidationError::InvalidTls {
                    message: format!("{label} path is empty"),
                });
            }
            if !Path::new(path).exists() {
                return Err(ValidationError::InvalidTls {
                    message: format!("{label} file not found: {path}"),
                });
            }
        }
        Ok(())
    }

    fn validate_forwarding(forwarding: &ForwardingConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if forwarding.max_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "forwarding.max_body_bytes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if forwarding.max_concurrent_attempts == Some(0) {
            errors.push(ValidationError::InvalidField {
                field: "forwarding.max_concurrent_attempts".to_string(),
                message: "must be at least 1 (omit it for unbounded fan-out)".to_string(),
            });
        }

        if let Err(e) = forwarding.excluded_header_names() {
            errors.push(e);
        }
        if let Err(e) = forwarding.attempt_timeout() {
            errors.push(e);
        }
        if let Err(e) = forwarding.request_timeout() {
            errors.push(e);
        }

        errors
    }

    fn validate_logging(logging: &LoggingConfig) -> ValidationResult<()> {
        if logging.level.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "logging.level".to_string(),
            });
        }
        tracing_subscriber::EnvFilter::try_new(&logging.level).map_err(|e| {
            ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(())
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| format!("  {}. {}", i + 1, e))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
