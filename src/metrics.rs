//! Lightweight metrics helpers for fanout.
//!
//! This module wraps the `metrics` crate macros. It does not embed an exporter;
//! the embedding application installs whatever recorder it prefers, and without
//! one every call here is a no-op.
//!
//! Provided metrics:
//! * `fanout_requests_total` (counter, label `verdict`)
//! * `fanout_request_duration_seconds` (histogram)
//! * `fanout_attempts_total` (counter, label `outcome`)
//! * `fanout_attempt_duration_seconds` (histogram)
//! * `fanout_resolved_addresses` (histogram)
//!
//! The `*Timer` structs leverage `Drop` to record durations even when a request
//! is cancelled mid-flight.
use std::time::Instant;

use ::metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const FANOUT_REQUESTS_TOTAL: &str = "fanout_requests_total";
pub const FANOUT_REQUEST_DURATION_SECONDS: &str = "fanout_request_duration_seconds";
pub const FANOUT_ATTEMPTS_TOTAL: &str = "fanout_attempts_total";
pub const FANOUT_ATTEMPT_DURATION_SECONDS: &str = "fanout_attempt_duration_seconds";
pub const FANOUT_RESOLVED_ADDRESSES: &str = "fanout_resolved_addresses";

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        FANOUT_REQUESTS_TOTAL,
        Unit::Count,
        "Inbound fan-out requests by verdict (ok, failed, not_found, rejected, cancelled)."
    );
    describe_histogram!(
        FANOUT_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of inbound fan-out requests, including the slowest target."
    );
    describe_counter!(
        FANOUT_ATTEMPTS_TOTAL,
        Unit::Count,
        "Outbound attempts by outcome (success, error_status, transport_error, timeout, invalid)."
    );
    describe_histogram!(
        FANOUT_ATTEMPT_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of single outbound attempts up to response headers."
    );
    describe_histogram!(
        FANOUT_RESOLVED_ADDRESSES,
        Unit::Count,
        "Number of addresses a service name resolved to."
    );
});

/// Count one finished inbound request.
pub fn increment_request_total(verdict: &'static str) {
    counter!(FANOUT_REQUESTS_TOTAL, "verdict" => verdict).increment(1);
}

/// Count one finished outbound attempt.
pub fn increment_attempt_total(outcome: &'static str) {
    counter!(FANOUT_ATTEMPTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_resolved_addresses(count: usize) {
    histogram!(FANOUT_RESOLVED_ADDRESSES).record(count as f64);
}

/// RAII helper measuring inbound request duration.
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for RequestTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        histogram!(FANOUT_REQUEST_DURATION_SECONDS).record(self.start.elapsed().as_secs_f64());
    }
}

/// RAII helper measuring a single attempt.
pub struct AttemptTimer {
    start: Instant,
}

impl AttemptTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for AttemptTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AttemptTimer {
    fn drop(&mut self) {
        histogram!(FANOUT_ATTEMPT_DURATION_SECONDS).record(self.start.elapsed().as_secs_f64());
    }
}

/// Register metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    tracing::info!("Initializing fanout metrics");
    Lazy::force(&DESCRIPTIONS);
    Ok(())
}
