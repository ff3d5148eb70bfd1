//! API configuration.

use std::path::PathBuf;

use mediaq_queue::QueueConfig;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Directory uploaded inputs are staged in
    pub upload_dir: PathBuf,
    /// Max request body size
    pub max_body_size: usize,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Run a worker pool inside the API process; unset means "only with the in-memory store"
    pub embedded_workers: Option<bool>,
    /// Whether to expose Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            upload_dir: PathBuf::from("./uploads"),
            max_body_size: 512 * 1024 * 1024, // 512MB
            cors_origins: vec!["*".to_string()],
            embedded_workers: None,
            metrics_enabled: true,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            embedded_workers: std::env::var("EMBEDDED_WORKERS")
                .ok()
                .map(|v| v == "true" || v == "1"),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Whether this process should run its own worker pool.
    ///
    /// The in-memory store is only visible inside this process, so it
    /// defaults to embedded workers; a shared Redis queue defaults to
    /// standalone workers.
    pub fn runs_embedded_workers(&self, queue: &QueueConfig) -> bool {
        self.embedded_workers.unwrap_or_else(|| queue.is_in_memory())
    }
}
