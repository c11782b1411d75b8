//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_config_updates_total` (counter): documents seen by the sync loop, by outcome
//! - `proxy_config_violations_total` (counter): validation failures, by rule
//! - `proxy_routes_active` / `proxy_clusters_active` (gauge): size of the live table
//! - `proxy_table_version` (gauge): version of the live table
//! - `proxy_watch_restarts_total` (counter): re-established store watches
//! - `proxy_requests_total` (counter): proxied requests, by status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_redirects_total` / `proxy_redirect_misses_total` (counter): www redirects
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// One document processed by the sync loop.
pub fn record_config_update(outcome: &'static str) {
    counter!("proxy_config_updates_total", "outcome" => outcome).increment(1);
}

pub fn record_config_violation(rule: &'static str) {
    counter!("proxy_config_violations_total", "rule" => rule).increment(1);
}

pub fn record_table(version: u64, routes: usize, clusters: usize) {
    gauge!("proxy_table_version").set(version as f64);
    gauge!("proxy_routes_active").set(routes as f64);
    gauge!("proxy_clusters_active").set(clusters as f64);
}

pub fn record_watch_restart() {
    counter!("proxy_watch_restarts_total").increment(1);
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [("method", method.to_string()), ("status", status.to_string())];
    counter!("proxy_requests_total", &labels).increment(1);
    histogram!("proxy_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_redirect() {
    counter!("proxy_redirects_total").increment(1);
}

pub fn record_redirect_miss() {
    counter!("proxy_redirect_misses_total").increment(1);
}
