//! Job submission, status and result handlers.

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::info;

use mediaq_models::{JobId, JobState, OperationKind};
use mediaq_worker::cleanup;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::JobStatusView;
use crate::state::AppState;
use crate::upload::stage_upload;

/// Response to a successful submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobState,
}

/// Stage the upload and enqueue it; never waits for a worker.
async fn submit(
    state: AppState,
    operation: OperationKind,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    let staged = stage_upload(&state.config.upload_dir, multipart).await?;

    let job_id = match state
        .queue
        .enqueue(operation.as_str(), &staged.path, staged.options)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            cleanup::remove_file(&staged.path).await;
            return Err(e.into());
        }
    };

    metrics::record_job_enqueued(operation);
    info!(
        job_id = %job_id,
        operation = %operation,
        size_bytes = staged.size,
        "Job queued"
    );

    Ok(Json(SubmitResponse {
        job_id,
        status: JobState::Queued,
    }))
}

/// POST /video/convert
pub async fn video_convert(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    submit(state, OperationKind::VideoConvert, multipart).await
}

/// POST /audio/extract
pub async fn audio_extract(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    submit(state, OperationKind::AudioExtract, multipart).await
}

/// POST /video/frames
pub async fn frame_extract(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    submit(state, OperationKind::FrameExtract, multipart).await
}

/// POST /audio/convert
pub async fn audio_convert(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    submit(state, OperationKind::AudioConvert, multipart).await
}

/// POST /image/convert
pub async fn image_convert(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    submit(state, OperationKind::ImageConvert, multipart).await
}

/// POST /media/probe
pub async fn probe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    submit(state, OperationKind::Probe, multipart).await
}

/// GET /job/:jobId
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    let view = state.jobs.status(&JobId::from_string(job_id)).await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    /// Which output to stream, for multi-artifact jobs
    pub index: Option<usize>,
}

/// GET /job/:jobId/result
///
/// Streams a stateless-mode artifact. Object-storage results are served from
/// their URL and rejected here.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<ResultQuery>,
) -> ApiResult<Response> {
    let artifact = state
        .jobs
        .open_artifact(&JobId::from_string(job_id), query.index)
        .await?;

    metrics::record_artifact_download(artifact.content_type);

    let disposition = format!(
        "attachment; filename=\"{}\"",
        artifact.filename.replace(['"', '\\'], "_")
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.content_type)
        .header(header::CONTENT_LENGTH, artifact.len)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(ReaderStream::new(artifact.file)))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
