//! Background tasks tied to a held lease: heartbeats and progress reports.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use mediaq_media::ProgressCallback;
use mediaq_queue::{JobStore, Lease};

use crate::retry::FailureTracker;

/// Keeps a lease alive and forwards executor progress while a job runs.
///
/// Both tasks stop when [`LeaseKeeper::stop`] is called or the keeper is
/// dropped.
pub struct LeaseKeeper {
    heartbeat: JoinHandle<()>,
    progress: JoinHandle<()>,
    progress_tx: Arc<watch::Sender<u8>>,
}

impl LeaseKeeper {
    pub fn start(
        store: Arc<dyn JobStore>,
        lease: Lease,
        interval: Duration,
        lease_for: Duration,
    ) -> Self {
        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&store),
            lease.clone(),
            interval,
            lease_for,
        ));

        let (progress_tx, progress_rx) = watch::channel(0u8);
        let progress = tokio::spawn(progress_loop(store, lease, progress_rx));

        Self {
            heartbeat,
            progress,
            progress_tx: Arc::new(progress_tx),
        }
    }

    /// Callback handed to the executor; only changed percentages are reported.
    pub fn progress_callback(&self) -> ProgressCallback {
        let tx = Arc::clone(&self.progress_tx);
        Arc::new(move |pct: u8| {
            tx.send_if_modified(|current| {
                if *current == pct {
                    false
                } else {
                    *current = pct;
                    true
                }
            });
        })
    }

    /// Stop both tasks. Progress already queued may be dropped.
    pub fn stop(self) {
        self.heartbeat.abort();
        self.progress.abort();
    }
}

impl Drop for LeaseKeeper {
    fn drop(&mut self) {
        self.heartbeat.abort();
        self.progress.abort();
    }
}

async fn heartbeat_loop(
    store: Arc<dyn JobStore>,
    lease: Lease,
    interval: Duration,
    lease_for: Duration,
) {
    let mut tracker = FailureTracker::new(3);
    let mut ticker = tokio::time::interval(interval);
    // The claim itself set the first deadline
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match store.heartbeat(&lease, lease_for).await {
            Ok(true) => tracker.record_success(),
            Ok(false) => {
                warn!("Lost lease on job {}; stopping heartbeat", lease.job_id);
                return;
            }
            Err(e) => {
                if tracker.record_failure() {
                    warn!("Heartbeat for job {} failed: {}", lease.job_id, e);
                }
            }
        }
    }
}

async fn progress_loop(store: Arc<dyn JobStore>, lease: Lease, mut rx: watch::Receiver<u8>) {
    while rx.changed().await.is_ok() {
        let pct = *rx.borrow_and_update();
        match store.report_progress(&lease, serde_json::json!(pct)).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Progress for job {} ignored; lease no longer held", lease.job_id);
                return;
            }
            Err(e) => debug!("Progress report for job {} failed: {}", lease.job_id, e),
        }
    }
}
