//! In-process job store.
//!
//! Same contract as the Redis store, minus durability across restarts. Used
//! by tests and by the single-process (`memory://`) deployment.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use mediaq_models::{Job, JobId, JobResult, JobState, StorageMode};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::store::{stalled_error, ClaimedJob, JobStore, Lease, RecoveredJob, Recovery};

struct HeldLease {
    token: String,
    deadline: Instant,
}

struct Entry {
    job: Job,
    lease: Option<HeldLease>,
    /// Set when the job reaches a terminal state
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Entry>,
    /// Claim order
    ready: VecDeque<JobId>,
    /// Backed-off jobs and the instant they become claimable
    delayed: Vec<(Instant, JobId)>,
    closed: bool,
}

impl Inner {
    fn promote(&mut self, now: Instant) -> usize {
        let (due, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.delayed).into_iter().partition(|(at, _)| *at <= now);
        self.delayed = waiting;

        let mut due = due;
        due.sort_by_key(|(at, _)| *at);
        let promoted = due.len();
        self.ready.extend(due.into_iter().map(|(_, id)| id));
        promoted
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.iter().map(|(at, _)| *at).min()
    }

    fn evict(&mut self, now: Instant) {
        self.jobs
            .retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
    }

    /// The entry, if `lease` still holds it.
    fn held_mut(&mut self, lease: &Lease) -> Option<&mut Entry> {
        self.jobs.get_mut(&lease.job_id).filter(|entry| {
            entry.job.state == JobState::Active
                && entry
                    .lease
                    .as_ref()
                    .is_some_and(|held| held.token == lease.token)
        })
    }
}

/// Mutex-guarded map with a FIFO ready list.
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
    notify: Notify,
    completed_retention: Duration,
    failed_retention: Duration,
}

impl MemoryJobStore {
    pub fn new(config: &QueueConfig) -> Self {
        Self::with_retention(config.completed_retention, config.failed_retention)
    }

    pub fn with_retention(completed: Duration, failed: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            completed_retention: completed,
            failed_retention: failed,
        }
    }

    fn retention_for(&self, success: bool) -> Duration {
        if success {
            self.completed_retention
        } else {
            self.failed_retention
        }
    }

    /// Finish `entry` with `result`.
    fn finish(&self, entry: &mut Entry, result: JobResult, now: Instant) {
        let ts = Utc::now();
        entry.job.state = if result.success {
            JobState::Completed
        } else {
            JobState::Failed
        };
        if !result.success {
            entry.job.failed_reason = result.error.clone();
        }
        entry.expires_at = Some(now + self.retention_for(result.success));
        entry.job.result = Some(result);
        entry.job.finished_at = Some(ts);
        entry.job.updated_at = ts;
        entry.lease = None;
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new(&QueueConfig::in_memory())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, job: Job) -> QueueResult<JobId> {
        let id = job.id.clone();
        {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(QueueError::Closed);
            }
            inner.jobs.insert(
                id.clone(),
                Entry {
                    job,
                    lease: None,
                    expires_at: None,
                },
            );
            inner.ready.push_back(id.clone());
        }
        self.notify.notify_one();
        debug!("Enqueued job {}", id);
        Ok(id)
    }

    async fn claim(
        &self,
        worker_id: &str,
        wait: Duration,
        lease_for: Duration,
    ) -> QueueResult<Option<ClaimedJob>> {
        let deadline = Instant::now() + wait;

        loop {
            // Registered before the check so a concurrent enqueue is not missed
            let notified = self.notify.notified();

            let next_due = {
                let mut guard = self.inner.lock().await;
                let inner = &mut *guard;
                if inner.closed {
                    return Ok(None);
                }

                let now = Instant::now();
                inner.promote(now);
                inner.evict(now);

                while let Some(id) = inner.ready.pop_front() {
                    let Some(entry) = inner.jobs.get_mut(&id) else {
                        continue;
                    };
                    if entry.job.state != JobState::Queued {
                        continue;
                    }

                    entry.job.state = JobState::Active;
                    entry.job.attempts += 1;
                    entry.job.progress = None;
                    entry.job.updated_at = Utc::now();

                    let lease = Lease::issue(id.clone(), entry.job.attempts);
                    entry.lease = Some(HeldLease {
                        token: lease.token.clone(),
                        deadline: now + lease_for,
                    });

                    debug!(
                        "Worker {} claimed job {} (attempt {})",
                        worker_id, id, lease.attempt
                    );
                    return Ok(Some(ClaimedJob {
                        job: entry.job.clone(),
                        lease,
                    }));
                }

                inner.next_due()
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let until = next_due.map_or(deadline, |due| due.min(deadline));

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(until) => {}
            }
        }
    }

    async fn heartbeat(&self, lease: &Lease, lease_for: Duration) -> QueueResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.held_mut(lease).and_then(|entry| entry.lease.as_mut()) {
            Some(held) => {
                held.deadline = Instant::now() + lease_for;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn report_progress(
        &self,
        lease: &Lease,
        progress: serde_json::Value,
    ) -> QueueResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.held_mut(lease) {
            Some(entry) => {
                entry.job.progress = Some(progress);
                entry.job.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn retry_later(&self, lease: &Lease, delay: Duration, error: &str) -> QueueResult<bool> {
        {
            let mut inner = self.inner.lock().await;
            let Some(entry) = inner.held_mut(lease) else {
                return Ok(false);
            };

            entry.job.state = JobState::Queued;
            entry.job.failed_reason = Some(error.to_string());
            entry.job.progress = None;
            entry.job.updated_at = Utc::now();
            entry.lease = None;

            let id = lease.job_id.clone();
            if delay.is_zero() {
                inner.ready.push_back(id);
            } else {
                inner.delayed.push((Instant::now() + delay, id));
            }
        }
        self.notify.notify_one();
        Ok(true)
    }

    async fn report_terminal(&self, lease: &Lease, result: JobResult) -> QueueResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.held_mut(lease) else {
            return Ok(false);
        };
        self.finish(entry, result, Instant::now());
        Ok(true)
    }

    async fn fetch(&self, id: &JobId) -> QueueResult<Job> {
        let mut inner = self.inner.lock().await;
        inner.evict(Instant::now());
        inner
            .jobs
            .get(id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| QueueError::not_found(id.as_str()))
    }

    async fn recover_stalled(&self, mode: StorageMode) -> QueueResult<Vec<RecoveredJob>> {
        let mut recovered = Vec::new();
        {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let now = Instant::now();

            for (id, entry) in inner.jobs.iter_mut() {
                let expired = entry.job.state == JobState::Active
                    && entry.lease.as_ref().is_some_and(|held| held.deadline <= now);
                if !expired {
                    continue;
                }

                let error = stalled_error(entry.job.attempts);
                let recovery = if entry.job.has_attempts_remaining() {
                    entry.job.state = JobState::Queued;
                    entry.job.failed_reason = Some(error);
                    entry.job.progress = None;
                    entry.job.updated_at = Utc::now();
                    entry.lease = None;
                    inner.ready.push_back(id.clone());
                    info!("Requeued stalled job {}", id);
                    Recovery::Requeued
                } else {
                    self.finish(entry, JobResult::failure(mode, error), now);
                    warn!("Failed stalled job {} after {} attempts", id, entry.job.attempts);
                    Recovery::Failed
                };

                recovered.push(RecoveredJob {
                    job: entry.job.clone(),
                    recovery,
                });
            }
        }

        if recovered.iter().any(|r| r.recovery == Recovery::Requeued) {
            self.notify.notify_waiters();
        }
        Ok(recovered)
    }

    async fn promote_due(&self) -> QueueResult<usize> {
        let promoted = {
            let mut inner = self.inner.lock().await;
            let now = Instant::now();
            inner.evict(now);
            inner.promote(now)
        };
        if promoted > 0 {
            self.notify.notify_waiters();
        }
        Ok(promoted)
    }

    async fn mark_downloaded(&self, id: &JobId) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::not_found(id.as_str()))?;
        if entry.job.downloaded_at.is_none() {
            entry.job.downloaded_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        if self.inner.lock().await.closed {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    async fn close(&self) -> QueueResult<()> {
        self.inner.lock().await.closed = true;
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use mediaq_models::{OperationKind, StorageMode, StoredArtifact};

    const LEASE: Duration = Duration::from_secs(30);

    fn job(max_attempts: u32) -> Job {
        Job::new(
            OperationKind::VideoConvert,
            "/tmp/in.mov",
            serde_json::json!({}),
            max_attempts,
        )
    }

    fn success() -> JobResult {
        JobResult::single(
            StorageMode::Stateless,
            StoredArtifact::Local(PathBuf::from("/tmp/out.mp4")),
        )
    }

    async fn claim_now(store: &MemoryJobStore) -> Option<ClaimedJob> {
        store.claim("w", Duration::ZERO, LEASE).await.unwrap()
    }

    #[tokio::test]
    async fn test_fetch_unknown_job_is_not_found() {
        let store = MemoryJobStore::default();
        let err = store.fetch(&JobId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_claims_in_enqueue_order() {
        let store = MemoryJobStore::default();
        let first = store.enqueue(job(3)).await.unwrap();
        let second = store.enqueue(job(3)).await.unwrap();

        let a = claim_now(&store).await.unwrap();
        let b = claim_now(&store).await.unwrap();
        assert_eq!(a.job.id, first);
        assert_eq!(b.job.id, second);
        assert!(claim_now(&store).await.is_none());
    }

    #[tokio::test]
    async fn test_claim_activates_and_counts_attempt() {
        let store = MemoryJobStore::default();
        let id = store.enqueue(job(3)).await.unwrap();

        let claimed = claim_now(&store).await.unwrap();
        assert_eq!(claimed.job.state, JobState::Active);
        assert_eq!(claimed.job.attempts, 1);
        assert_eq!(claimed.lease.attempt, 1);
        assert_eq!(store.fetch(&id).await.unwrap().state, JobState::Active);
    }

    #[tokio::test]
    async fn test_exactly_one_concurrent_claimant() {
        let store = Arc::new(MemoryJobStore::default());
        store.enqueue(job(3)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .claim(&format!("w{i}"), Duration::from_millis(50), LEASE)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_blocking_claim_wakes_on_enqueue() {
        let store = Arc::new(MemoryJobStore::default());
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.claim("w", Duration::from_secs(5), LEASE).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let id = store.enqueue(job(3)).await.unwrap();

        let claimed = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(claimed.job.id, id);
    }

    #[tokio::test]
    async fn test_terminal_report_is_idempotent() {
        let store = MemoryJobStore::default();
        let id = store.enqueue(job(3)).await.unwrap();
        let claimed = claim_now(&store).await.unwrap();

        assert!(store.report_terminal(&claimed.lease, success()).await.unwrap());
        let after_first = store.fetch(&id).await.unwrap();

        assert!(!store.report_terminal(&claimed.lease, success()).await.unwrap());
        assert!(!store
            .report_terminal(
                &claimed.lease,
                JobResult::failure(StorageMode::Stateless, "late"),
            )
            .await
            .unwrap());

        let after_second = store.fetch(&id).await.unwrap();
        assert_eq!(after_second.state, JobState::Completed);
        assert_eq!(after_first.result, after_second.result);
        assert!(after_second.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_progress_ignored_after_terminal() {
        let store = MemoryJobStore::default();
        let id = store.enqueue(job(3)).await.unwrap();
        let claimed = claim_now(&store).await.unwrap();

        assert!(store
            .report_progress(&claimed.lease, serde_json::json!(40))
            .await
            .unwrap());
        store
            .report_terminal(
                &claimed.lease,
                JobResult::failure(StorageMode::Stateless, "boom"),
            )
            .await
            .unwrap();
        assert!(!store
            .report_progress(&claimed.lease, serde_json::json!(90))
            .await
            .unwrap());

        let snapshot = store.fetch(&id).await.unwrap();
        assert_eq!(snapshot.state, JobState::Failed);
        assert_eq!(snapshot.failed_reason.as_deref(), Some("boom"));
        assert_eq!(snapshot.progress, Some(serde_json::json!(40)));
    }

    #[tokio::test]
    async fn test_retry_backoff_delays_reclaim() {
        let store = MemoryJobStore::default();
        let id = store.enqueue(job(3)).await.unwrap();
        let claimed = claim_now(&store).await.unwrap();

        assert!(store
            .retry_later(&claimed.lease, Duration::from_millis(80), "transient")
            .await
            .unwrap());

        let snapshot = store.fetch(&id).await.unwrap();
        assert_eq!(snapshot.state, JobState::Queued);
        assert_eq!(snapshot.failed_reason.as_deref(), Some("transient"));
        assert!(claim_now(&store).await.is_none(), "claimable before backoff elapsed");

        let again = store
            .claim("w", Duration::from_secs(2), LEASE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.job.id, id);
        assert_eq!(again.job.attempts, 2);
        assert_ne!(again.lease.token, claimed.lease.token);

        // The first lease is dead
        assert!(!store.report_terminal(&claimed.lease, success()).await.unwrap());
    }

    #[tokio::test]
    async fn test_stalled_job_is_requeued() {
        let store = MemoryJobStore::default();
        let id = store.enqueue(job(3)).await.unwrap();
        let stale = store
            .claim("crashed", Duration::ZERO, Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let recovered = store.recover_stalled(StorageMode::Stateless).await.unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].recovery, Recovery::Requeued);

        let again = claim_now(&store).await.unwrap();
        assert_eq!(again.job.id, id);
        assert_eq!(again.job.attempts, 2);
        assert!(!store.heartbeat(&stale.lease, LEASE).await.unwrap());
    }

    #[tokio::test]
    async fn test_heartbeat_prevents_recovery() {
        let store = MemoryJobStore::default();
        store.enqueue(job(3)).await.unwrap();
        let claimed = store
            .claim("w", Duration::ZERO, Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();

        assert!(store.heartbeat(&claimed.lease, LEASE).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.recover_stalled(StorageMode::Stateless).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_job_fails_when_attempts_exhausted() {
        let store = MemoryJobStore::default();
        let id = store.enqueue(job(1)).await.unwrap();
        store
            .claim("crashed", Duration::ZERO, Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let recovered = store.recover_stalled(StorageMode::ObjectStorage).await.unwrap();
        assert_eq!(recovered[0].recovery, Recovery::Failed);

        let snapshot = store.fetch(&id).await.unwrap();
        assert_eq!(snapshot.state, JobState::Failed);
        assert_eq!(snapshot.attempts, 1);
        let result = snapshot.result.unwrap();
        assert_eq!(result.mode, Some(StorageMode::ObjectStorage));
        assert!(result.error.unwrap().contains("stalled"));
    }

    #[tokio::test]
    async fn test_terminal_jobs_evicted_after_retention() {
        let store =
            MemoryJobStore::with_retention(Duration::from_millis(20), Duration::from_secs(60));
        let id = store.enqueue(job(3)).await.unwrap();
        let claimed = claim_now(&store).await.unwrap();
        store.report_terminal(&claimed.lease, success()).await.unwrap();

        assert!(store.fetch(&id).await.is_ok());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.fetch(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_close_releases_waiting_claims() {
        let store = Arc::new(MemoryJobStore::default());
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.claim("w", Duration::from_secs(10), LEASE).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.close().await.unwrap();

        let claimed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("claim should return after close")
            .unwrap()
            .unwrap();
        assert!(claimed.is_none());
        assert!(matches!(store.enqueue(job(3)).await, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn test_mark_downloaded_keeps_first_timestamp() {
        let store = MemoryJobStore::default();
        let id = store.enqueue(job(3)).await.unwrap();

        store.mark_downloaded(&id).await.unwrap();
        let first = store.fetch(&id).await.unwrap().downloaded_at;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.mark_downloaded(&id).await.unwrap();

        assert!(first.is_some());
        assert_eq!(store.fetch(&id).await.unwrap().downloaded_at, first);
        assert!(store.mark_downloaded(&JobId::new()).await.is_err());
    }
}
