//! Job queue facade: validation in front of a [`JobStore`].

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use mediaq_models::{Job, JobId, OperationKind, OperationOptions};

use crate::config::QueueConfig;
use crate::error::QueueResult;
use crate::memory::MemoryJobStore;
use crate::redis_store::RedisJobStore;
use crate::store::JobStore;

/// Job queue client shared by the API and the worker pool.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    config: QueueConfig,
}

impl JobQueue {
    /// Wrap an existing store.
    pub fn new(store: Arc<dyn JobStore>, config: QueueConfig) -> Self {
        Self { store, config }
    }

    /// Connect the backend selected by `config.redis_url`.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let store: Arc<dyn JobStore> = if config.is_in_memory() {
            info!("Using in-memory job store");
            Arc::new(MemoryJobStore::new(&config))
        } else {
            let store = RedisJobStore::new(config.clone())?;
            store.init().await?;
            info!("Using Redis job store for queue {}", config.queue_name);
            Arc::new(store)
        };
        Ok(Self::new(store, config))
    }

    /// Create from environment variables.
    pub async fn from_env() -> QueueResult<Self> {
        Self::connect(QueueConfig::from_env()).await
    }

    /// Validate and enqueue a job; returns immediately without waiting for a worker.
    ///
    /// Unknown operation kinds and malformed options are rejected with
    /// `QueueError::Validation`.
    pub async fn enqueue(
        &self,
        operation: &str,
        input_path: impl Into<PathBuf>,
        options: serde_json::Value,
    ) -> QueueResult<JobId> {
        let kind: OperationKind = operation.parse()?;
        OperationOptions::parse(kind, &options)?;

        let job = Job::new(kind, input_path, options, self.config.max_attempts);
        self.store.enqueue(job).await
    }

    /// Current job snapshot; `JobNotFound` for unknown or evicted ids.
    pub async fn fetch_status(&self, id: &JobId) -> QueueResult<Job> {
        self.store.fetch(id).await
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Stop handing out jobs.
    pub async fn close(&self) -> QueueResult<()> {
        self.store.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use mediaq_models::JobState;

    async fn queue() -> JobQueue {
        JobQueue::connect(QueueConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_returns_unique_ids() {
        let queue = queue().await;
        let a = queue
            .enqueue("probe", "/tmp/a.mp4", serde_json::Value::Null)
            .await
            .unwrap();
        let b = queue
            .enqueue("probe", "/tmp/b.mp4", serde_json::Value::Null)
            .await
            .unwrap();
        assert_ne!(a, b);

        let job = queue.fetch_status(&a).await.unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_validation_error() {
        let queue = queue().await;
        let err = queue
            .enqueue("video-reverse", "/tmp/a.mp4", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
    }

    #[tokio::test]
    async fn test_malformed_options_are_validation_error() {
        let queue = queue().await;
        let err = queue
            .enqueue(
                "image-convert",
                "/tmp/a.png",
                serde_json::json!({"quality": 99}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let queue = queue().await;
        assert!(queue
            .fetch_status(&JobId::new())
            .await
            .unwrap_err()
            .is_not_found());
    }
}
