//! Job status service: the caller's view of a job and its artifacts.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use mediaq_models::{Job, JobId, JobResult, JobState, OperationKind, StorageMode};
use mediaq_queue::JobQueue;
use mediaq_storage::content_type_for;

use crate::error::{ApiError, ApiResult};

/// Status view returned by `GET /job/:jobId`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobState,
    pub operation: OperationKind,
    pub progress: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    /// Only set once the job has failed for good
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        // Errors from attempts that were retried are not the caller's concern
        let failed_reason = match job.state {
            JobState::Failed => job.failed_reason,
            _ => None,
        };
        Self {
            job_id: job.id,
            status: job.state,
            operation: job.operation,
            progress: job.progress.unwrap_or_else(|| serde_json::json!(0)),
            result: job.result,
            failed_reason,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            created_at: job.created_at,
            updated_at: job.updated_at,
            finished_at: job.finished_at,
        }
    }
}

/// A locally stored artifact ready to be streamed.
#[derive(Debug)]
pub struct Artifact {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub filename: String,
    pub file: tokio::fs::File,
    pub len: u64,
}

#[derive(Clone)]
pub struct JobStatusService {
    queue: JobQueue,
}

impl JobStatusService {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    /// Status view; `JobNotFound` for unknown or evicted ids.
    pub async fn status(&self, id: &JobId) -> ApiResult<JobStatusView> {
        let job = self.queue.fetch_status(id).await?;
        Ok(job.into())
    }

    /// Open the `index`-th local artifact of a completed stateless job and
    /// record the download.
    pub async fn open_artifact(&self, id: &JobId, index: Option<usize>) -> ApiResult<Artifact> {
        let job = self.queue.fetch_status(id).await?;
        let path = local_artifact_path(&job, index.unwrap_or(0))?;

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApiError::gone("Output file is no longer available"));
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();

        if let Err(e) = self.queue.store().mark_downloaded(id).await {
            warn!("Failed to record download of job {}: {}", id, e);
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());

        Ok(Artifact {
            content_type: content_type_for(&path),
            filename,
            file,
            len,
            path,
        })
    }
}

/// Which local file a download request refers to, or why there is none.
fn local_artifact_path(job: &Job, index: usize) -> ApiResult<PathBuf> {
    if job.state != JobState::Completed {
        return Err(ApiError::bad_request(format!(
            "Job not completed (status: {})",
            job.state
        )));
    }

    let result = match &job.result {
        Some(result) if result.success => result,
        _ => return Err(ApiError::bad_request("Job has no successful result")),
    };

    if result.mode == Some(StorageMode::ObjectStorage) {
        return Err(ApiError::bad_request(
            "Result is stored in object storage; use the URL from the job status",
        ));
    }

    let paths = result.local_paths();
    if paths.is_empty() {
        return Err(ApiError::bad_request("No output file available"));
    }

    paths
        .get(index)
        .map(|p| p.to_path_buf())
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "Output index {} out of range ({} outputs)",
                index,
                paths.len()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mediaq_models::{FormatInfo, MediaInfo, StoredArtifact};
    use mediaq_queue::QueueConfig;

    async fn finished_job(queue: &JobQueue, kind: &str, result: JobResult) -> JobId {
        let id = queue
            .enqueue(kind, "/tmp/in.mov", serde_json::Value::Null)
            .await
            .unwrap();
        let claimed = queue
            .store()
            .claim("test", Duration::ZERO, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert!(queue
            .store()
            .report_terminal(&claimed.lease, result)
            .await
            .unwrap());
        id
    }

    async fn service() -> (JobStatusService, JobQueue) {
        let queue = JobQueue::connect(QueueConfig::in_memory()).await.unwrap();
        (JobStatusService::new(queue.clone()), queue)
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (service, _) = service().await;
        let err = service.status(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::Queue(e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_queued_job_view() {
        let (service, queue) = service().await;
        let id = queue
            .enqueue("probe", "/tmp/in.mp4", serde_json::Value::Null)
            .await
            .unwrap();

        let view = service.status(&id).await.unwrap();
        assert_eq!(view.status, JobState::Queued);
        assert_eq!(view.progress, serde_json::json!(0));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["jobId"], id.as_str());
        assert!(json.get("result").is_none());
    }

    #[tokio::test]
    async fn test_retried_job_hides_intermediate_error() {
        let (service, queue) = service().await;
        let id = queue
            .enqueue("probe", "/tmp/in.mp4", serde_json::Value::Null)
            .await
            .unwrap();
        let claimed = queue
            .store()
            .claim("test", Duration::ZERO, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        queue
            .store()
            .retry_later(&claimed.lease, Duration::from_secs(60), "boom")
            .await
            .unwrap();

        let view = service.status(&id).await.unwrap();
        assert_eq!(view.status, JobState::Queued);
        assert!(view.failed_reason.is_none());
    }

    #[tokio::test]
    async fn test_object_storage_result_is_rejected() {
        let (service, queue) = service().await;
        let id = finished_job(
            &queue,
            "video-convert",
            JobResult::single(
                StorageMode::ObjectStorage,
                StoredArtifact::Remote("https://cdn.example.com/a.mp4".into()),
            ),
        )
        .await;

        let err = service.open_artifact(&id, None).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("object storage")));
    }

    #[tokio::test]
    async fn test_probe_result_has_no_artifact() {
        let (service, queue) = service().await;
        let id = finished_job(
            &queue,
            "probe",
            JobResult::probe(
                StorageMode::Stateless,
                MediaInfo {
                    format: FormatInfo {
                        duration: 1.0,
                        ..Default::default()
                    },
                    streams: Vec::new(),
                },
            ),
        )
        .await;

        let err = service.open_artifact(&id, None).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_open_frame_by_index_marks_download() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<PathBuf> = (1..=2).map(|i| dir.path().join(format!("f-{i}.jpg"))).collect();
        for frame in &frames {
            tokio::fs::write(frame, b"jpeg").await.unwrap();
        }

        let (service, queue) = service().await;
        let id = finished_job(
            &queue,
            "frame-extract",
            JobResult::multiple(
                StorageMode::Stateless,
                frames.iter().cloned().map(StoredArtifact::Local).collect(),
            ),
        )
        .await;

        let artifact = service.open_artifact(&id, Some(1)).await.unwrap();
        assert_eq!(artifact.filename, "f-2.jpg");
        assert_eq!(artifact.content_type, "image/jpeg");
        assert_eq!(artifact.len, 4);
        assert!(queue.fetch_status(&id).await.unwrap().downloaded_at.is_some());

        let err = service.open_artifact(&id, Some(2)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_deleted_output_is_gone() {
        let (service, queue) = service().await;
        let id = finished_job(
            &queue,
            "video-convert",
            JobResult::single(
                StorageMode::Stateless,
                StoredArtifact::Local(PathBuf::from("/nonexistent/mediaq/out.mp4")),
            ),
        )
        .await;

        let err = service.open_artifact(&id, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Gone(_)));
    }
}
