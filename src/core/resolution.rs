//! Address resolution step of the pipeline.
//!
//! Lookup failures never reach the HTTP caller: they are logged here and turned
//! into an empty address set, which the pipeline answers with 404.
use std::net::IpAddr;

use tokio_util::sync::CancellationToken;

use crate::ports::resolver::{ResolutionError, Resolver};

/// Resolve `service_name`, absorbing every failure into an empty result.
///
/// Cancellation while the lookup is in flight is treated like a failed lookup;
/// the caller is expected to check the token afterwards.
pub async fn resolve_addresses(
    resolver: &dyn Resolver,
    service_name: &str,
    cancel: &CancellationToken,
) -> Vec<IpAddr> {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ResolutionError::Cancelled(service_name.to_string())),
        result = resolver.resolve(service_name) => result,
    };

    match result {
        Ok(addresses) if addresses.is_empty() => {
            tracing::warn!(service = %service_name, "Could not find host");
            addresses
        }
        Ok(addresses) => {
            tracing::debug!(
                service = %service_name,
                count = addresses.len(),
                "Resolved service addresses"
            );
            addresses
        }
        Err(ResolutionError::Cancelled(_)) => {
            tracing::debug!(service = %service_name, "Resolution cancelled");
            Vec::new()
        }
        Err(e) => {
            tracing::error!(
                service = %service_name,
                error.kind = ?e.kind(),
                "Resolver error while trying to find host: {}",
                e
            );
            Vec::new()
        }
    }
}
