//! Record store request metrics.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "vtube_store_requests_total";
    pub const RETRIES_TOTAL: &str = "vtube_store_retries_total";
    pub const LATENCY_SECONDS: &str = "vtube_store_latency_seconds";
}

/// Record a finished request.
pub fn record_request(operation: &'static str, status: u16, latency_secs: f64) {
    counter!(names::REQUESTS_TOTAL, "operation" => operation, "status" => status.to_string())
        .increment(1);
    histogram!(names::LATENCY_SECONDS, "operation" => operation).record(latency_secs);
}

pub fn record_retry(operation: &'static str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation).increment(1);
}
