//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_stage_rejections_total` (counter): rejections by pipeline stage and code
//! - `guard_rate_limited_total` (counter): tier limiter rejections by tier
//! - `guard_throttle_delay_seconds` (histogram): delay added by the throttle
//! - `guard_security_events_total` (counter): audit events by kind
//! - `guard_honeypot_trips_total` (counter): fabricated honeypot responses
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder the
//!   calls are no-ops, so tests need no setup
//! - Prometheus exporter is optional and owns its own listener

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_stage_rejection(stage: &'static str, code: &'static str) {
    counter!("guard_stage_rejections_total", "stage" => stage, "code" => code).increment(1);
}

pub fn record_rate_limited(tier: &'static str) {
    counter!("guard_rate_limited_total", "tier" => tier).increment(1);
}

pub fn record_throttle_delay(delay: Duration) {
    histogram!("guard_throttle_delay_seconds").record(delay.as_secs_f64());
}

pub fn record_security_event(kind: &'static str) {
    counter!("guard_security_events_total", "kind" => kind).increment(1);
}

pub fn record_honeypot_trip() {
    counter!("guard_honeypot_trips_total").increment(1);
}
