//! Metrics collection and exposition.
//!
//! # Metrics
//! - `candy_confirmations_total` (counter): resolved confirmations by source, outcome
//! - `candy_broadcast_latency_seconds` (histogram): submission to resolution, by outcome
//! - `candy_resubmissions_total` (counter): redundant rebroadcasts
//! - `candy_batch_transactions_total` (counter): batch results by policy, outcome
//! - `candy_ledger_health` (gauge): 1=healthy, 0=unhealthy

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// A confirmation attempt resolved. `source` is the racer that won.
pub fn record_confirmation(source: &'static str, outcome: &'static str) {
    metrics::counter!("candy_confirmations_total", "source" => source, "outcome" => outcome)
        .increment(1);
}

pub fn record_broadcast(outcome: &'static str, latency: Duration) {
    metrics::histogram!("candy_broadcast_latency_seconds", "outcome" => outcome)
        .record(latency.as_secs_f64());
}

pub fn record_resubmissions(count: u64) {
    metrics::counter!("candy_resubmissions_total").increment(count);
}

pub fn record_batch(policy: &'static str, succeeded: usize, failed: usize) {
    metrics::counter!("candy_batch_transactions_total", "policy" => policy, "outcome" => "success")
        .increment(succeeded as u64);
    metrics::counter!("candy_batch_transactions_total", "policy" => policy, "outcome" => "failure")
        .increment(failed as u64);
}

pub fn record_ledger_health(endpoint: &str, healthy: bool) {
    metrics::gauge!("candy_ledger_health", "endpoint" => endpoint.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
