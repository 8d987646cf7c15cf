//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by upstream, method, status
//! - `gateway_request_duration_seconds` (histogram): latency by upstream
//! - `gateway_upstream_health` (gauge): 1=healthy, 0=unhealthy, per upstream
//! - `gateway_cert_ok` (gauge): 1 when the served certificate is usable
//! - `gateway_logins_total` (counter): login callbacks by outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(upstream: &str, method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "upstream" => upstream.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "upstream" => upstream.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Requests for app names with no upstream share this label, so callers
/// cannot mint new series by inventing subdomains.
pub const UNKNOWN_UPSTREAM: &str = "unknown";

pub fn record_unknown_app(method: &str, start: Instant) {
    record_request(UNKNOWN_UPSTREAM, method, 404, start);
}

pub fn record_upstream_health(upstream: &str, healthy: bool) {
    metrics::gauge!("gateway_upstream_health", "upstream" => upstream.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_cert(ok: bool) {
    metrics::gauge!("gateway_cert_ok").set(if ok { 1.0 } else { 0.0 });
}

pub fn record_login(outcome: &'static str) {
    metrics::counter!("gateway_logins_total", "outcome" => outcome).increment(1);
}
