//! Periodic queue maintenance: promote backed-off jobs, recover stalled ones.
//!
//! Every worker process runs this loop. The store's transitions are atomic,
//! so concurrent runs from several processes are harmless.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use mediaq_models::StorageMode;
use mediaq_queue::{JobStore, QueueResult, RecoveredJob, Recovery};

use crate::cleanup;
use crate::metrics;
use crate::retry::FailureTracker;

pub struct Maintenance {
    store: Arc<dyn JobStore>,
    /// Stamped on jobs failed by recovery
    mode: StorageMode,
    interval: Duration,
}

impl Maintenance {
    pub fn new(store: Arc<dyn JobStore>, mode: StorageMode, interval: Duration) -> Self {
        Self {
            store,
            mode,
            interval,
        }
    }

    /// One maintenance pass.
    ///
    /// Jobs failed by recovery have no worker left to clean up after them,
    /// so their inputs are removed here.
    pub async fn run_once(&self) -> QueueResult<Vec<RecoveredJob>> {
        let promoted = self.store.promote_due().await?;
        if promoted > 0 {
            debug!("Promoted {} delayed jobs", promoted);
        }

        let recovered = self.store.recover_stalled(self.mode).await?;
        for entry in &recovered {
            metrics::record_job_recovered(entry.recovery);
            match entry.recovery {
                Recovery::Requeued => {
                    info!("Requeued stalled job {} (attempt {})", entry.job.id, entry.job.attempts)
                }
                Recovery::Failed => {
                    warn!("Stalled job {} failed after {} attempts", entry.job.id, entry.job.attempts);
                    cleanup::remove_file(&entry.job.input_path).await;
                }
            }
        }
        Ok(recovered)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut tracker = FailureTracker::new(3);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(_) => tracker.record_success(),
                        Err(e) => {
                            if tracker.record_failure() {
                                warn!("Queue maintenance failed: {}", e);
                            }
                        }
                    }
                }
            }
        }
        debug!("Maintenance loop stopped");
    }
}
