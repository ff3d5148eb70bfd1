//! Queue configuration.

use std::time::Duration;

use mediaq_models::DEFAULT_MAX_ATTEMPTS;

/// `REDIS_URL` scheme that selects the in-process store.
pub const MEMORY_URL_SCHEME: &str = "memory://";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL, or `memory://` for the in-process store
    pub redis_url: String,
    /// Queue name; namespaces every Redis key
    pub queue_name: String,
    /// Retry ceiling stamped on new jobs
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff
    pub backoff_base: Duration,
    /// How long completed jobs stay queryable
    pub completed_retention: Duration,
    /// How long failed jobs stay queryable
    pub failed_retention: Duration,
    /// Idle time after which an unacknowledged stream delivery is swept
    pub pending_idle: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            queue_name: "ffmpeg-processing".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(2000),
            completed_retention: Duration::from_secs(3600), // 1 hour
            failed_retention: Duration::from_secs(86400),   // 24 hours
            pending_idle: Duration::from_secs(60),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            queue_name: std::env::var("QUEUE_NAME").unwrap_or(defaults.queue_name),
            max_attempts: std::env::var("JOB_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            backoff_base: std::env::var("JOB_BACKOFF_BASE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            completed_retention: std::env::var("JOB_RETENTION_COMPLETED_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.completed_retention),
            failed_retention: std::env::var("JOB_RETENTION_FAILED_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.failed_retention),
            pending_idle: std::env::var("QUEUE_PENDING_IDLE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.pending_idle),
        }
    }

    /// In-memory config, mainly for tests and single-process mode.
    pub fn in_memory() -> Self {
        Self {
            redis_url: MEMORY_URL_SCHEME.to_string(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.redis_url.starts_with(MEMORY_URL_SCHEME)
    }

    /// Root of every Redis key owned by this queue.
    pub fn key_prefix(&self) -> String {
        format!("mediaq:{}", self.queue_name)
    }

    /// Retention window for a job that ended in `success`/failure.
    pub fn retention_for(&self, success: bool) -> Duration {
        if success {
            self.completed_retention
        } else {
            self.failed_retention
        }
    }
}
