//! Ports (traits) the fan-out pipeline depends on. Adapters in
//! [`crate::adapters`] provide the default implementations.
pub mod http_client;
pub mod resolver;

pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
pub use resolver::{ResolutionError, ResolutionResult, Resolver};
