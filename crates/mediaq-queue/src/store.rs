//! The job store contract.
//!
//! Every state change goes through one atomic compare-and-swap in the
//! backing store, keyed on the job's current state and, for a held job, the
//! claimant's lease token. That is what makes claims exclusive and terminal
//! reports idempotent.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use mediaq_models::{Job, JobId, JobResult, StorageMode};

use crate::error::QueueResult;

/// Proof that a worker slot holds a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub job_id: JobId,
    /// Random token written into the job record at claim time
    pub token: String,
    /// Attempt number this lease belongs to (1-based)
    pub attempt: u32,
}

impl Lease {
    pub(crate) fn issue(job_id: JobId, attempt: u32) -> Self {
        Self {
            job_id,
            token: Self::new_token(),
            attempt,
        }
    }

    pub(crate) fn new_token() -> String {
        Uuid::new_v4().to_string()
    }
}

/// A job handed to a worker slot.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    /// Snapshot taken right after the claim (state `active`)
    pub job: Job,
    pub lease: Lease,
}

/// What `recover_stalled` did with an abandoned job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Put back on the ready list for another attempt
    Requeued,
    /// Attempts exhausted; failed terminally
    Failed,
}

/// A job whose lease expired.
#[derive(Debug, Clone)]
pub struct RecoveredJob {
    pub job: Job,
    pub recovery: Recovery,
}

/// Error recorded on jobs abandoned by a crashed or hung worker.
pub(crate) fn stalled_error(attempts: u32) -> String {
    format!("Job stalled: worker lease expired after {attempts} attempt(s)")
}

/// Durable job storage.
///
/// Methods taking a [`Lease`] are no-ops returning `Ok(false)` when the
/// caller no longer holds the job (it was recovered, or already reached a
/// terminal state). `Ok(true)` means this call performed the transition.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new queued job and make it claimable.
    async fn enqueue(&self, job: Job) -> QueueResult<JobId>;

    /// Claim the oldest ready job, waiting up to `wait` for one to appear.
    ///
    /// The job moves to `active`, `attempts` is incremented and a lease
    /// valid for `lease_for` is issued.
    async fn claim(
        &self,
        worker_id: &str,
        wait: Duration,
        lease_for: Duration,
    ) -> QueueResult<Option<ClaimedJob>>;

    /// Extend a lease.
    async fn heartbeat(&self, lease: &Lease, lease_for: Duration) -> QueueResult<bool>;

    /// Record progress for a held job.
    async fn report_progress(&self, lease: &Lease, progress: serde_json::Value)
        -> QueueResult<bool>;

    /// Return a held job to `queued`; it becomes claimable after `delay`.
    async fn retry_later(&self, lease: &Lease, delay: Duration, error: &str) -> QueueResult<bool>;

    /// Move a held job to `completed` or `failed` per `result.success`.
    async fn report_terminal(&self, lease: &Lease, result: JobResult) -> QueueResult<bool>;

    /// Current snapshot; `JobNotFound` for unknown or evicted ids.
    async fn fetch(&self, id: &JobId) -> QueueResult<Job>;

    /// Requeue or fail active jobs whose lease has expired.
    ///
    /// `mode` is stamped on the failure payload of jobs that run out of attempts.
    async fn recover_stalled(&self, mode: StorageMode) -> QueueResult<Vec<RecoveredJob>>;

    /// Move backed-off jobs whose delay has elapsed onto the ready list.
    async fn promote_due(&self) -> QueueResult<usize>;

    /// Record the first artifact download.
    async fn mark_downloaded(&self, id: &JobId) -> QueueResult<()>;

    /// Check the backing store is reachable.
    async fn ping(&self) -> QueueResult<()>;

    /// Stop handing out jobs; pending `claim` calls return `None`.
    async fn close(&self) -> QueueResult<()>;
}
