//! Metrics definitions for the relying party.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rp_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `status`: success, error
//! - `error_category`: see [`ErrorCategory`](super::ErrorCategory)
//! - `document`: signed_jwks, entity_statement
//! - `operation`: token, jwks, embedded_ui

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return a handle for `/metrics`.
///
/// # Errors
///
/// Fails if a global recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Broker calls are bounded by the outbound timeout (max 60s)
        .set_buckets_for_metric(
            Matcher::Prefix("rp_broker_request".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000,
            ],
        )
        .map_err(|e| format!("Failed to set broker request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record the outcome of an ID token exchange and verification.
///
/// Metric: `rp_token_verifications_total`
/// Labels: `status`, `error_category`
pub fn record_token_verification(status: &str, error_category: Option<&str>) {
    let category = error_category.unwrap_or("none");
    counter!(
        "rp_token_verifications_total",
        "status" => status.to_string(),
        "error_category" => category.to_string()
    )
    .increment(1);
}

/// Record a broker key set refresh.
///
/// Metric: `rp_broker_key_refresh_total`
/// Labels: `status`
pub fn record_broker_key_refresh(status: &str) {
    counter!("rp_broker_key_refresh_total", "status" => status.to_string()).increment(1);
}

/// Record an authorization request redirect.
///
/// Metric: `rp_authorization_requests_total`
/// Labels: `status`
pub fn record_authorization_request(status: &str) {
    counter!("rp_authorization_requests_total", "status" => status.to_string()).increment(1);
}

/// Record a trust document build.
///
/// Metric: `rp_trust_documents_total`
/// Labels: `document`, `status`
pub fn record_trust_document(document: &str, status: &str) {
    counter!(
        "rp_trust_documents_total",
        "document" => document.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record an outbound broker request.
///
/// Metric: `rp_broker_request_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_broker_request(operation: &str, status: &str, duration: Duration) {
    histogram!(
        "rp_broker_request_duration_seconds",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}
