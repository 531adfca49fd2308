//! Metrics collection and exposition.
//!
//! # Metrics
//! - `registrar_notifications_total` (counter): notify calls by result
//! - `registrar_flush_total` (counter): flush attempts by result; failures also carry a reason
//! - `registrar_pending_patches` (gauge): patches waiting for the next flush
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; a no-op until an exporter is installed
//! - `reason="not_found"` is kept apart from transient failures so a deleted
//!   pod is visible to operators even though the engine keeps retrying

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the outcome of a notify call (`queued`, `duplicate`, `cancelled`, `replaced`, `rejected`).
pub fn record_notification(result: &'static str) {
    metrics::counter!("registrar_notifications_total", "result" => result).increment(1);
}

pub fn record_flush_success() {
    metrics::counter!("registrar_flush_total", "result" => "success").increment(1);
}

/// Record a failed flush. `reason` comes from `StoreError::reason`.
pub fn record_flush_failure(reason: &'static str) {
    metrics::counter!("registrar_flush_total", "result" => "failure", "reason" => reason).increment(1);
}

pub fn record_pending(count: usize) {
    metrics::gauge!("registrar_pending_patches").set(count as f64);
}
