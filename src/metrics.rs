//! Metrics and telemetry for the DID service
//!
//! Provides Prometheus-compatible metrics for monitoring:
//! - Resolutions by tier and outcome
//! - Chain-crawl depth
//! - Upstream (remote resolver / indexer) failures
//! - Chain operations (issue, update, deactivate)

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Resolutions by answering tier and outcome
    pub static ref DID_RESOLUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "did_resolutions_total",
        "Total number of DID resolutions",
        &["tier", "outcome"]
    )
    .unwrap();

    /// Hops taken by each chain crawl
    pub static ref DID_CRAWL_HOPS: Histogram = register_histogram!(
        "did_crawl_hops",
        "Transactions visited per chain crawl",
        vec![1.0, 2.0, 3.0, 5.0, 10.0, 25.0, 50.0, 100.0]
    )
    .unwrap();

    /// Failed calls to upstream services
    pub static ref DID_UPSTREAM_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "did_upstream_failures_total",
        "Total number of failed upstream calls",
        &["service"]
    )
    .unwrap();

    /// Chain operations by type and status
    pub static ref DID_CHAIN_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "did_chain_operations_total",
        "Total number of DID chain operations",
        &["operation", "status"]
    )
    .unwrap();
}

/// Record a resolution answered by `tier`
pub fn record_resolution(tier: &str, outcome: &str) {
    DID_RESOLUTIONS_TOTAL
        .with_label_values(&[tier, outcome])
        .inc();
}

/// Record the depth of a finished crawl
pub fn record_crawl_hops(hops: usize) {
    DID_CRAWL_HOPS.observe(hops as f64);
}

/// Record a failed upstream call
pub fn record_upstream_failure(service: &str) {
    DID_UPSTREAM_FAILURES_TOTAL
        .with_label_values(&[service])
        .inc();
}

/// Record a chain operation
pub fn record_chain_operation(operation: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    DID_CHAIN_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
