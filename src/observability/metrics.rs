//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): gate decisions by `decision`
//! - `gate_security_events_total` (counter): events by `kind`
//! - `gate_settings_fallback_total` (counter): settings loads that fell back to defaults
//! - `gate_rate_limit_entries` (gauge): live rate-limit keys after each sweep
//! - `gate_upstream_duration_seconds` (histogram): upstream latency by `status`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_decision(decision: &'static str) {
    counter!("gate_requests_total", "decision" => decision).increment(1);
}

pub fn record_security_event(kind: &'static str) {
    counter!("gate_security_events_total", "kind" => kind).increment(1);
}

pub fn record_settings_fallback() {
    counter!("gate_settings_fallback_total").increment(1);
}

pub fn record_rate_limit_entries(count: usize) {
    gauge!("gate_rate_limit_entries").set(count as f64);
}

pub fn record_upstream(status: u16, start: Instant) {
    histogram!("gate_upstream_duration_seconds", "status" => status.to_string())
        .record(start.elapsed().as_secs_f64());
}
