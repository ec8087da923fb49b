//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): handled calls by action, strategy, status
//! - `dispatch_request_duration_seconds` (histogram): latency by action
//! - `dispatch_upstream_errors_total` (counter): transport failures by upstream host
//! - `dispatch_cache_total` (counter): cache lookups by result (hit, miss, revalidated)
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels stay low-cardinality: action names and hosts, never full URLs

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve `GET /metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint enabled");
    Ok(())
}

/// Record one handled call.
pub fn record_request(action: &str, strategy: &'static str, status: u16, start: Instant) {
    counter!(
        "dispatch_requests_total",
        "action" => action.to_string(),
        "strategy" => strategy,
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "dispatch_request_duration_seconds",
        "action" => action.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record a call the transport could not complete.
pub fn record_upstream_error(host: &str) {
    counter!("dispatch_upstream_errors_total", "host" => host.to_string()).increment(1);
}

/// Record a cache lookup outcome.
pub fn record_cache(result: &'static str) {
    counter!("dispatch_cache_total", "result" => result).increment(1);
}
