//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::jobs::{
    audio_convert, audio_extract, frame_extract, get_job, get_job_result, image_convert, probe,
    video_convert,
};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Submission endpoints: multipart `file` plus optional JSON `options`
    let submit_routes = Router::new()
        .route("/video/convert", post(video_convert))
        .route("/video/frames", post(frame_extract))
        .route("/audio/extract", post(audio_extract))
        .route("/audio/convert", post(audio_convert))
        .route("/image/convert", post(image_convert))
        .route("/media/probe", post(probe))
        // Uploads are bounded by RequestBodyLimitLayer below, not axum's 2MB default
        .layer(DefaultBodyLimit::disable());

    let job_routes = Router::new()
        .route("/job/:jobId", get(get_job))
        .route("/job/:jobId/result", get(get_job_result));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(submit_routes)
        .merge(job_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
