//! Queue error types.

use thiserror::Error;

use mediaq_models::{OptionsError, UnknownOperation};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Submission rejected; never retried
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Queue is closed")]
    Closed,

    #[error("Corrupt job record {id}: {message}")]
    Corrupt { id: String, message: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::JobNotFound(id.into())
    }

    pub fn corrupt(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound(_))
    }
}

impl From<UnknownOperation> for QueueError {
    fn from(e: UnknownOperation) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<OptionsError> for QueueError {
    fn from(e: OptionsError) -> Self {
        Self::Validation(e.to_string())
    }
}
