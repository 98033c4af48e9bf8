//! Worker metrics.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "vtube_worker_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vtube_worker_jobs_failed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "vtube_worker_jobs_retried_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "vtube_worker_jobs_dead_lettered_total";
    pub const UPLOAD_DURATION_SECONDS: &str = "vtube_worker_upload_duration_seconds";
    pub const COMPENSATING_DELETES_TOTAL: &str = "vtube_worker_compensating_deletes_total";
}

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

pub fn record_job_completed(outcome: &'static str) {
    counter!(names::JOBS_COMPLETED_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_job_failed(kind: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind).increment(1);
}

pub fn record_job_retried() {
    counter!(names::JOBS_RETRIED_TOTAL).increment(1);
}

pub fn record_job_dead_lettered() {
    counter!(names::JOBS_DEAD_LETTERED_TOTAL).increment(1);
}

/// Wall time of the concurrent upload pair.
pub fn record_upload_duration(secs: f64, success: bool) {
    let result = if success { "ok" } else { "error" };
    histogram!(names::UPLOAD_DURATION_SECONDS, "result" => result).record(secs);
}

pub fn record_compensating_delete(success: bool) {
    let result = if success { "ok" } else { "error" };
    counter!(names::COMPENSATING_DELETES_TOTAL, "result" => result).increment(1);
}
