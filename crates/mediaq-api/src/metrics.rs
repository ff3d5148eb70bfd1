//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use mediaq_models::OperationKind;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
///
/// Worker metrics from an embedded pool are recorded into the same registry.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "mediaq_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "mediaq_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "mediaq_http_requests_in_flight";

    // Job metrics
    pub const JOBS_ENQUEUED_TOTAL: &str = "mediaq_jobs_enqueued_total";
    pub const ARTIFACT_DOWNLOADS_TOTAL: &str = "mediaq_artifact_downloads_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_enqueued(operation: OperationKind) {
    let labels = [("operation", operation.as_str().to_string())];
    counter!(names::JOBS_ENQUEUED_TOTAL, &labels).increment(1);
}

pub fn record_artifact_download(content_type: &str) {
    let labels = [("content_type", content_type.to_string())];
    counter!(names::ARTIFACT_DOWNLOADS_TOTAL, &labels).increment(1);
}

/// Collapse job IDs so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').collect();
    for i in 1..segments.len() {
        if segments[i - 1] == "job" && !segments[i].is_empty() {
            segments[i] = ":jobId";
        }
    }
    segments.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/job/550e8400-e29b-41d4-a716-446655440000/result"),
            "/job/:jobId/result"
        );
        assert_eq!(sanitize_path("/job/abc"), "/job/:jobId");
        assert_eq!(sanitize_path("/video/convert"), "/video/convert");
    }
}
