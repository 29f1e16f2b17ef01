//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pipeline_requests_total` (counter): requests by service, method, status
//! - `pipeline_request_duration_seconds` (histogram): round-trip latency by service
//! - `pipeline_cache_lookups_total` (counter): hit, miss, error, corrupt
//! - `pipeline_cache_writes_total` (counter): detached write outcome
//! - `pipeline_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `pipeline_circuit_rejections_total` (counter): calls refused by a breaker
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::breaker::State;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed round trip. `status` is 0 when no response was produced.
pub fn record_request(service: &str, method: &str, status: u16, start: Instant) {
    counter!(
        "pipeline_requests_total",
        "service" => service.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("pipeline_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(result: &'static str) {
    counter!("pipeline_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_write(outcome: &'static str) {
    counter!("pipeline_cache_writes_total", "outcome" => outcome).increment(1);
}

pub fn record_circuit_state(name: &str, state: State) {
    let value = match state {
        State::Closed => 0.0,
        State::HalfOpen => 1.0,
        State::Open => 2.0,
    };
    gauge!("pipeline_circuit_state", "name" => name.to_string()).set(value);
}

pub fn record_circuit_rejection(name: &str) {
    counter!("pipeline_circuit_rejections_total", "name" => name.to_string()).increment(1);
}
