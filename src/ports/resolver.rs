use std::{io, net::IpAddr};

use async_trait::async_trait;
use thiserror::Error;

/// Error type for service name resolution
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ResolutionError {
    /// The underlying lookup failed at the socket / resolver level
    #[error("Lookup of '{host}' failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The lookup was abandoned because the inbound request was cancelled
    #[error("Lookup of '{0}' was cancelled")]
    Cancelled(String),
}

impl ResolutionError {
    /// Resolver-specific classification of the failure, when one is available.
    pub fn kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Lookup { source, .. } => Some(source.kind()),
            Self::Cancelled(_) => None,
        }
    }
}

/// Result type alias for resolution operations
pub type ResolutionResult<T> = Result<T, ResolutionError>;

/// Resolver defines the port (interface) turning a logical service name into
/// every address currently backing it.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// Resolve `service_name` to zero or more addresses.
    ///
    /// A clean miss is `Ok(vec![])`; only transport level failures are errors.
    async fn resolve(&self, service_name: &str) -> ResolutionResult<Vec<IpAddr>>;
}
