//! Application state.

use std::sync::Arc;

use mediaq_queue::JobQueue;
use mediaq_storage::StorageResolver;

use crate::config::ApiConfig;
use crate::services::JobStatusService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub queue: JobQueue,
    /// Used for the storage mode and readiness checks; uploads happen in workers
    pub storage: StorageResolver,
    pub jobs: JobStatusService,
}

impl AppState {
    pub fn new(config: ApiConfig, queue: JobQueue, storage: StorageResolver) -> Self {
        let jobs = JobStatusService::new(queue.clone());
        Self {
            config: Arc::new(config),
            queue,
            storage,
            jobs,
        }
    }
}
