pub mod dns_resolver;
pub mod http_client;
pub mod http_handler;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use dns_resolver::DnsResolver;
pub use http_client::HttpClientAdapter;
pub use http_handler::HttpHandler;
pub use middleware::*;
