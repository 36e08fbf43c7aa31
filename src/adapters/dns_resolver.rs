use std::{
    io,
    net::{IpAddr, SocketAddr},
};

use async_trait::async_trait;

use crate::ports::resolver::{ResolutionError, ResolutionResult, Resolver};

/// Resolver adapter backed by the system resolver (`getaddrinfo` through
/// `tokio::net::lookup_host`).
///
/// Headless service names typically come back with one A/AAAA record per
/// instance. Duplicates are collapsed while keeping the resolver's order.
#[derive(Debug, Clone, Default)]
pub struct DnsResolver;

impl DnsResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, service_name: &str) -> ResolutionResult<Vec<IpAddr>> {
        // IP literals skip the lookup
        if let Ok(ip) = service_name.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        match tokio::net::lookup_host((service_name, 0)).await {
            Ok(addrs) => Ok(unique_ips(addrs)),
            Err(e) if is_clean_miss(&e) => {
                tracing::debug!("No records for {}: {}", service_name, e);
                Ok(Vec::new())
            }
            Err(source) => Err(ResolutionError::Lookup {
                host: service_name.to_string(),
                source,
            }),
        }
    }
}

fn unique_ips(addrs: impl IntoIterator<Item = SocketAddr>) -> Vec<IpAddr> {
    let mut ips: Vec<IpAddr> = Vec::new();
    for addr in addrs {
        let ip = addr.ip();
        if !ips.contains(&ip) {
            ips.push(ip);
        }
    }
    ips
}

// getaddrinfo reports NXDOMAIN / NODATA as an error; treat it as "no instances".
fn is_clean_miss(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::NotFound {
        return true;
    }
    let message = err.to_string().to_ascii_lowercase();
    message.contains("name or service not known")
        || message.contains("no address associated")
        || message.contains("nodename nor servname")
}
