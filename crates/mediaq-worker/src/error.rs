//! Worker error types.

use std::time::Duration;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The job record cannot be executed as stored; retrying will not help
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] mediaq_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] mediaq_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] mediaq_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if the failure counts against the attempt budget and may be retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            WorkerError::InvalidJob(_)
                | WorkerError::ConfigError(_)
                | WorkerError::Media(mediaq_media::MediaError::InvalidOptions(_))
        )
    }

    /// Description recorded as the job's failure reason.
    pub fn describe(&self) -> String {
        match self {
            WorkerError::Media(e) => e.describe(),
            other => other.to_string(),
        }
    }
}
