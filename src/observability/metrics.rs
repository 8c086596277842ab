//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): rejections by tier
//! - `gateway_errors_total` (counter): classified failures by kind, code
//! - `gateway_auth_failures_total` (counter): authentication failures by code
//! - `gateway_retries_total` / `gateway_retry_exhausted_total` (counter): by operation class
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::ErrorKind;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(tier: &str) {
    counter!("gateway_rate_limited_total", "tier" => tier.to_string()).increment(1);
}

pub fn record_error(kind: ErrorKind, code: &str) {
    counter!(
        "gateway_errors_total",
        "kind" => kind.as_str(),
        "code" => code.to_string()
    )
    .increment(1);
}

pub fn record_auth_failure(code: &str) {
    counter!("gateway_auth_failures_total", "code" => code.to_string()).increment(1);
}

pub fn record_retry(operation_class: &str) {
    counter!("gateway_retries_total", "operation_class" => operation_class.to_string())
        .increment(1);
}

pub fn record_retry_exhausted(operation_class: &str) {
    counter!(
        "gateway_retry_exhausted_total",
        "operation_class" => operation_class.to_string()
    )
    .increment(1);
}
