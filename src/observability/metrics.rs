//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, dispatch kind
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_upstream_calls_total` (counter): outbound calls by upstream, outcome
//! - `gateway_upstream_duration_seconds` (histogram): outbound latency
//! - `gateway_route_reloads_total` (counter): route table loads by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - Upstream labels carry the upstream identity, never a credential

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, kind: &'static str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "kind" => kind,
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream(upstream: &str, outcome: &'static str, latency: Duration) {
    counter!(
        "gateway_upstream_calls_total",
        "upstream" => upstream.to_string(),
        "outcome" => outcome,
    )
    .increment(1);
    histogram!("gateway_upstream_duration_seconds", "upstream" => upstream.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_route_reload(outcome: &'static str) {
    counter!("gateway_route_reloads_total", "outcome" => outcome).increment(1);
}
