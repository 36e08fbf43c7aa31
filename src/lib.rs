//! fanout - an HTTP fan-out proxy for headless services.
//!
//! A request to `/{service_name}/{target_port}/{*rest}` is resolved to every
//! address currently behind `service_name`, replayed against each of them on
//! `target_port` concurrently, and answered with one aggregate JSON report:
//!
//! ```json
//! {"responses":[{"statusCode":200,"address":"http://10.0.0.1:8080/status"}]}
//! ```
//!
//! The proxy answers `200 OK` only when every target answered 2xx, `400 Bad Request`
//! otherwise, and `404 Not Found` with an empty body when the name resolves to nothing.
//!
//! # Features
//! - Name resolution through the system resolver (A/AAAA records of headless services)
//! - Request body captured once and replayed byte-for-byte to every target
//! - Header replication with configurable exclusions (`Host` is always rewritten)
//! - Concurrent dispatch with optional per-attempt timeout and concurrency bound
//! - Cancellation of the whole pipeline on client disconnect or request deadline
//! - Structured tracing via `tracing` and metrics via the `metrics` facade
//! - Graceful shutdown on SIGINT / SIGTERM
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use fanout::{DnsResolver, FanOutService, HttpClientAdapter, HttpHandler, config::ServerConfig};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg: ServerConfig = fanout::config::loader::load_config("config.yaml").await?;
//! let service = FanOutService::from_config(
//!     Arc::new(DnsResolver::new()),
//!     Arc::new(HttpClientAdapter::new()?),
//!     &cfg.forwarding,
//! )?;
//! let router = HttpHandler::new(
//!     Arc::new(service),
//!     cfg.listener_scheme(),
//!     cfg.forwarding.request_timeout()?,
//! )
//! .router();
//! let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
//! axum::serve(listener, router).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! the pipeline inside `core`. Tests swap the resolver and client ports for in-memory fakes.
//!
//! # Error Handling
//! Pipeline stages return domain error types built with `thiserror`; startup and glue code
//! return `eyre::Result<T>` with context attached through `WrapErr`.
// Re-export public modules with explicit visibility controls
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{DnsResolver, HttpClientAdapter, HttpHandler},
    core::{FanOutService, ServiceTarget},
    ports::{http_client::HttpClient, resolver::Resolver},
    utils::GracefulShutdown,
};
