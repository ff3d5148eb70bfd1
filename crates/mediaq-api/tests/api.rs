//! Router-level tests against the in-memory queue in stateless mode.

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use mediaq_api::{create_router, ApiConfig, AppState};
use mediaq_models::{JobResult, StorageMode, StoredArtifact};
use mediaq_queue::{JobQueue, QueueConfig};
use mediaq_storage::StorageResolver;

const BOUNDARY: &str = "mediaq-test-boundary";

struct TestApp {
    router: Router,
    queue: JobQueue,
    upload_dir: PathBuf,
    _dir: TempDir,
}

async fn app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("uploads");
    let config = ApiConfig {
        upload_dir: upload_dir.clone(),
        ..ApiConfig::default()
    };
    let queue = JobQueue::connect(QueueConfig::in_memory()).await.unwrap();
    let state = AppState::new(config, queue.clone(), StorageResolver::stateless());

    TestApp {
        router: create_router(state, None),
        queue,
        upload_dir,
        _dir: dir,
    }
}

fn multipart(file: Option<(&str, &[u8])>, options: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(options) = options {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"options\"\r\n\r\n{options}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn submit_request(path: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn staged_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_health_reports_storage_mode() {
    let app = app().await;
    let response = app.router.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storageMode"], "stateless");
}

#[tokio::test]
async fn test_ready_with_in_memory_queue() {
    let app = app().await;
    let response = app.router.oneshot(get("/ready")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = app().await;
    let response = app
        .router
        .oneshot(get("/job/does-not-exist"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["status"], "not-found");
}

#[tokio::test]
async fn test_submit_queues_job() {
    let app = app().await;
    let body = multipart(Some(("clip.mp4", b"not really a video")), None);
    let response = app
        .router
        .clone()
        .oneshot(submit_request("/media/probe", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "queued");
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let staged = staged_files(&app.upload_dir);
    assert_eq!(staged.len(), 1);
    assert!(staged[0].to_string_lossy().ends_with("-clip.mp4"));

    let response = app
        .router
        .oneshot(get(&format!("/job/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view = json_body(response).await;
    assert_eq!(view["jobId"], job_id.as_str());
    assert_eq!(view["status"], "queued");
    assert_eq!(view["operation"], "probe");
}

#[tokio::test]
async fn test_submit_with_options() {
    let app = app().await;
    let body = multipart(
        Some(("clip.mov", b"bytes")),
        Some(r#"{"codec":"libx265","fps":30}"#),
    );
    let response = app
        .router
        .oneshot(submit_request("/video/convert", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let job = app
        .queue
        .fetch_status(&mediaq_models::JobId::from_string(
            body["jobId"].as_str().unwrap().to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(job.options["codec"], "libx265");
}

#[tokio::test]
async fn test_submit_without_file_is_rejected() {
    let app = app().await;
    let body = multipart(None, Some("{}"));
    let response = app
        .router
        .oneshot(submit_request("/video/convert", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("No file provided"));
}

#[tokio::test]
async fn test_invalid_options_remove_staged_upload() {
    let app = app().await;
    let body = multipart(Some(("clip.mp4", b"bytes")), Some(r#"{"fps":999}"#));
    let response = app
        .router
        .clone()
        .oneshot(submit_request("/video/convert", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(staged_files(&app.upload_dir).is_empty());

    let body = multipart(Some(("clip.mp4", b"bytes")), Some("{not json"));
    let response = app
        .router
        .oneshot(submit_request("/video/convert", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(staged_files(&app.upload_dir).is_empty());
}

#[tokio::test]
async fn test_result_of_queued_job_is_rejected() {
    let app = app().await;
    let id = app
        .queue
        .enqueue("video-convert", "/tmp/in.mov", Value::Null)
        .await
        .unwrap();

    let response = app
        .router
        .oneshot(get(&format!("/job/{id}/result")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_completed_result_streams_artifact() {
    let app = app().await;
    let output = app._dir.path().join("converted.mp4");
    tokio::fs::write(&output, b"mp4 bytes").await.unwrap();

    let id = app
        .queue
        .enqueue("video-convert", "/tmp/in.mov", Value::Null)
        .await
        .unwrap();
    let claimed = app
        .queue
        .store()
        .claim("test", Duration::ZERO, Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    app.queue
        .store()
        .report_terminal(
            &claimed.lease,
            JobResult::single(StorageMode::Stateless, StoredArtifact::Local(output)),
        )
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/job/{id}")))
        .await
        .unwrap();
    let view = json_body(response).await;
    assert_eq!(view["status"], "completed");
    assert_eq!(view["result"]["success"], true);

    let response = app
        .router
        .oneshot(get(&format!("/job/{id}/result")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "9");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"converted.mp4\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"mp4 bytes");
}
