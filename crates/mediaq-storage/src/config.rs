//! Storage configuration.

use mediaq_models::StorageMode;

use crate::error::{StorageError, StorageResult};

/// Variables that must be set in object-storage mode.
const REQUIRED_S3_VARS: [&str; 4] = [
    "S3_ENDPOINT",
    "S3_BUCKET",
    "S3_ACCESS_KEY_ID",
    "S3_SECRET_ACCESS_KEY",
];

/// Connection settings for an S3-compatible bucket.
#[derive(Clone)]
pub struct S3Config {
    /// S3 API endpoint URL
    pub endpoint: String,
    /// Region ("auto" for R2-style providers)
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Public base URL for uploaded objects
    pub public_url: Option<String>,
    /// Key prefix for uploaded objects
    pub path_prefix: String,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .field("public_url", &self.public_url)
            .field("path_prefix", &self.path_prefix)
            .finish()
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub mode: StorageMode,
    /// Present only in object-storage mode
    pub s3: Option<S3Config>,
}

impl StorageConfig {
    /// Create config from environment variables.
    ///
    /// Fails when object-storage mode is selected and any required
    /// variable is missing; all missing names are reported at once.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = match var("STORAGE_MODE") {
            Some(raw) => raw.parse::<StorageMode>().map_err(StorageError::config)?,
            None => StorageMode::Stateless,
        };

        if mode == StorageMode::Stateless {
            return Ok(Self { mode, s3: None });
        }

        let missing: Vec<&str> = REQUIRED_S3_VARS
            .iter()
            .copied()
            .filter(|key| var(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(StorageError::config(format!(
                "object storage is enabled but missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let endpoint = var("S3_ENDPOINT").unwrap_or_default();
        url::Url::parse(&endpoint)
            .map_err(|e| StorageError::config(format!("S3_ENDPOINT is not a valid URL: {e}")))?;

        if let Some(public_url) = var("S3_PUBLIC_URL") {
            url::Url::parse(&public_url).map_err(|e| {
                StorageError::config(format!("S3_PUBLIC_URL is not a valid URL: {e}"))
            })?;
        }

        let s3 = S3Config {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            region: var("S3_REGION").unwrap_or_else(|| "auto".to_string()),
            bucket: var("S3_BUCKET").unwrap_or_default(),
            access_key_id: var("S3_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: var("S3_SECRET_ACCESS_KEY").unwrap_or_default(),
            public_url: var("S3_PUBLIC_URL").map(|u| u.trim_end_matches('/').to_string()),
            path_prefix: var("S3_PATH_PREFIX")
                .unwrap_or_else(|| "ffmpeg-rest".to_string())
                .trim_matches('/')
                .to_string(),
        };

        Ok(Self {
            mode,
            s3: Some(s3),
        })
    }
}
