//! Prometheus metrics emitted by the worker pool.
//!
//! Calls go through the `metrics` facade and are no-ops until a recorder is
//! installed, so the pool can run embedded in the API process (which owns
//! the recorder there) or standalone with its own listener.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use mediaq_models::OperationKind;
use mediaq_queue::Recovery;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "mediaq_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "mediaq_jobs_failed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "mediaq_jobs_retried_total";
    pub const JOBS_RECOVERED_TOTAL: &str = "mediaq_jobs_recovered_total";
    pub const JOB_DURATION_SECONDS: &str = "mediaq_job_duration_seconds";

    pub const UPLOADS_TOTAL: &str = "mediaq_uploads_total";
    pub const UPLOAD_DURATION_SECONDS: &str = "mediaq_upload_duration_seconds";

    pub const ARTIFACTS_SWEPT_TOTAL: &str = "mediaq_artifacts_swept_total";
}

/// Install a Prometheus recorder served on its own HTTP listener.
///
/// Used by the standalone worker binary; the API installs its own recorder
/// and renders it at `/metrics`.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    Ok(())
}

pub fn record_job_completed(operation: OperationKind, duration_secs: f64) {
    let labels = [("operation", operation.as_str().to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_failed(operation: OperationKind) {
    let labels = [("operation", operation.as_str().to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_job_retried(operation: OperationKind) {
    let labels = [("operation", operation.as_str().to_string())];
    counter!(names::JOBS_RETRIED_TOTAL, &labels).increment(1);
}

pub fn record_job_recovered(recovery: Recovery) {
    let outcome = match recovery {
        Recovery::Requeued => "requeued",
        Recovery::Failed => "failed",
    };
    counter!(names::JOBS_RECOVERED_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_upload(success: bool, duration_secs: f64) {
    let outcome = if success { "success" } else { "failure" };
    counter!(names::UPLOADS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::UPLOAD_DURATION_SECONDS).record(duration_secs);
}

pub fn record_artifacts_swept(count: usize) {
    counter!(names::ARTIFACTS_SWEPT_TOTAL).increment(count as u64);
}
