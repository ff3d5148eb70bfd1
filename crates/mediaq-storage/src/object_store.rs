//! Object store seam and its S3 implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::config::S3Config;
use crate::error::{StorageError, StorageResult};

/// Minimal write interface the resolver needs from a bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the full contents of `path` under `key`.
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Verify the bucket is reachable with the configured credentials.
    async fn check(&self) -> StorageResult<()>;
}

/// S3-compatible bucket client.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Create a new client from configuration.
    pub fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "mediaq",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {e}", path.display())))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                StorageError::upload_failed(format!(
                    "{key}: {}",
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    async fn check(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                StorageError::Unavailable(aws_sdk_s3::error::DisplayErrorContext(&e).to_string())
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: &str) -> S3Config {
        S3Config {
            endpoint: endpoint.to_string(),
            region: "auto".to_string(),
            bucket: "media".to_string(),
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string(),
            public_url: None,
            path_prefix: "ffmpeg-rest".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_file_sends_object_to_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/media/ffmpeg-rest/.+\.mp4$"))
            .and(header("content-type", "video/mp4"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.mp4");
        tokio::fs::write(&file, b"not really a video").await.unwrap();

        let store = S3Store::new(&config(&server.uri()));
        store
            .put_file(&file, "ffmpeg-rest/abc-out.mp4", "video/mp4")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_file_maps_rejection_to_upload_failed() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<Error><Code>InvalidAccessKeyId</Code><Message>bad key</Message></Error>",
            ))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.mp3");
        tokio::fs::write(&file, b"id3").await.unwrap();

        let store = S3Store::new(&config(&server.uri()));
        let err = store
            .put_file(&file, "ffmpeg-rest/abc-out.mp3", "audio/mpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UploadFailed(_)));
    }

    #[tokio::test]
    async fn test_put_missing_file_fails_before_network() {
        let store = S3Store::new(&config("http://127.0.0.1:9"));
        let err = store
            .put_file(Path::new("/nonexistent/out.mp4"), "k", "video/mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UploadFailed(_)));
    }
}
