//! Structured job logging utilities.

use tracing::{error, info, warn, Span};

use mediaq_models::{Job, JobId, OperationKind};

/// Job logger for structured logging with consistent formatting.
///
/// Every line carries the job ID, operation kind and attempt as fields so a
/// job's history can be followed across retries and workers.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: OperationKind,
    attempt: u32,
    max_attempts: u32,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: OperationKind, attempt: u32, max_attempts: u32) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
            attempt,
            max_attempts,
        }
    }

    /// Logger for a claimed job snapshot.
    pub fn for_job(job: &Job) -> Self {
        Self::new(&job.id, job.operation, job.attempts, job.max_attempts)
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            attempt = self.attempt,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            attempt = self.attempt,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            attempt = self.attempt,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation,
            attempt = self.attempt
        )
    }
}
