//! Metrics collection and exposition.
//!
//! # Metrics
//! - `status_remap_rewrites_total` (counter): statuses replaced, by `from`/`to`
//! - `status_remap_pipeline_failures_total` (counter): failed pipelines, by `kind`
//! - `status_remap_commit_failures_total` (counter): responses that failed to commit
//! - `status_remap_invalid_pairs_total` (counter): mapping pairs dropped at load
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Prometheus exporter runs its own HTTP listener

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and start its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rewrite(from: u16, to: u16) {
    counter!(
        "status_remap_rewrites_total",
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

pub fn record_pipeline_failure(kind: &'static str) {
    counter!("status_remap_pipeline_failures_total", "kind" => kind).increment(1);
}

pub fn record_commit_failure() {
    counter!("status_remap_commit_failures_total").increment(1);
}

pub fn record_invalid_pair() {
    counter!("status_remap_invalid_pairs_total").increment(1);
}
