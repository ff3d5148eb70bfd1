//! Storage resolver: decides where a produced artifact ends up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use mediaq_models::{StorageMode, StoredArtifact};

use crate::config::{S3Config, StorageConfig};
use crate::content_type::content_type_for;
use crate::error::{StorageError, StorageResult};
use crate::object_store::{ObjectStore, S3Store};

/// Where uploaded objects are addressed.
#[derive(Debug, Clone)]
struct UrlLayout {
    endpoint: String,
    bucket: String,
    public_url: Option<String>,
    path_prefix: String,
}

impl UrlLayout {
    fn from_config(config: &S3Config) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            bucket: config.bucket.clone(),
            public_url: config.public_url.clone(),
            path_prefix: config.path_prefix.clone(),
        }
    }

    /// `{prefix}/{uuid}-{filename}`.
    fn object_key(&self, path: &Path) -> String {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        let name = format!("{}-{}", Uuid::new_v4(), filename);
        if self.path_prefix.is_empty() {
            name
        } else {
            format!("{}/{}", self.path_prefix, name)
        }
    }

    /// Public URL if configured, otherwise `{endpoint}/{bucket}/{key}`.
    fn url_for(&self, key: &str) -> String {
        let encoded = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        match &self.public_url {
            Some(base) => format!("{base}/{encoded}"),
            None => format!("{}/{}/{encoded}", self.endpoint, self.bucket),
        }
    }
}

/// Resolves produced files into stored artifacts for the configured mode.
#[derive(Clone)]
pub struct StorageResolver {
    mode: StorageMode,
    remote: Option<(Arc<dyn ObjectStore>, UrlLayout)>,
}

impl StorageResolver {
    /// Resolver that leaves every artifact on local disk.
    pub fn stateless() -> Self {
        Self {
            mode: StorageMode::Stateless,
            remote: None,
        }
    }

    /// Resolver uploading through `store`, addressed per `config`.
    pub fn object_storage(store: Arc<dyn ObjectStore>, config: &S3Config) -> Self {
        Self {
            mode: StorageMode::ObjectStorage,
            remote: Some((store, UrlLayout::from_config(config))),
        }
    }

    /// Build from configuration, creating an S3 client in object-storage mode.
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        match (config.mode, &config.s3) {
            (StorageMode::Stateless, _) => Ok(Self::stateless()),
            (StorageMode::ObjectStorage, Some(s3)) => {
                Ok(Self::object_storage(Arc::new(S3Store::new(s3)), s3))
            }
            (StorageMode::ObjectStorage, None) => Err(StorageError::config(
                "object storage mode requires S3 settings",
            )),
        }
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    /// Resolve one local file.
    ///
    /// In object-storage mode the file is uploaded under a fresh key and the
    /// local copy is removed once the upload is confirmed. A failed upload
    /// leaves the local file for the caller's cleanup.
    pub async fn resolve(&self, path: &Path) -> StorageResult<StoredArtifact> {
        let Some((store, layout)) = &self.remote else {
            return Ok(StoredArtifact::Local(path.to_path_buf()));
        };

        let key = layout.object_key(path);
        store.put_file(path, &key, content_type_for(path)).await?;

        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Uploaded {} but failed to remove local copy: {}", path.display(), e);
        }

        let url = layout.url_for(&key);
        debug!(url = %url, "Resolved artifact to object storage");
        Ok(StoredArtifact::Remote(url))
    }

    /// Resolve files in order, stopping at the first failure.
    ///
    /// Files uploaded before the failure have already been removed locally;
    /// the rest are left for the caller.
    pub async fn resolve_all(&self, paths: &[PathBuf]) -> StorageResult<Vec<StoredArtifact>> {
        let mut artifacts = Vec::with_capacity(paths.len());
        for path in paths {
            artifacts.push(self.resolve(path).await?);
        }
        Ok(artifacts)
    }

    /// Verify the remote store is reachable; trivially true when stateless.
    pub async fn check(&self) -> StorageResult<()> {
        match &self.remote {
            Some((store, _)) => store.check().await,
            None => Ok(()),
        }
    }
}
