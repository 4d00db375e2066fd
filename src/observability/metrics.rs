//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cloud_config_fetch_total` (counter): fetch results by outcome
//!   (`updated`, `unchanged`, `error`)
//! - `cloud_config_bootstrap_winner_total` (counter): race winners by path
//!   (`chained`, `direct`)
//! - `cloud_config_merge_total` (counter): mutations by outcome
//!   (`applied`, `rejected`)
//! - `cloud_config_version` (gauge): version of the live configuration
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - The Prometheus exporter is opt-in from the binary

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_fetch(outcome: &'static str) {
    counter!("cloud_config_fetch_total", "outcome" => outcome).increment(1);
}

pub fn record_bootstrap_winner(path: &'static str) {
    counter!("cloud_config_bootstrap_winner_total", "path" => path).increment(1);
}

pub fn record_merge(outcome: &'static str) {
    counter!("cloud_config_merge_total", "outcome" => outcome).increment(1);
}

pub fn record_config_version(version: u64) {
    gauge!("cloud_config_version").set(version as f64);
}
