//! Worker pool: a fixed number of slots, each running claim → execute → finalize.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use mediaq_media::{MediaExecutor, MediaOutput};
use mediaq_models::{Job, JobResult, OperationOptions, StorageMode};
use mediaq_queue::{ClaimedJob, JobQueue, JobStore, Lease, QueueError, QueueResult};
use mediaq_storage::StorageResolver;

use crate::cleanup;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::lease::LeaseKeeper;
use crate::logging::JobLogger;
use crate::maintenance::Maintenance;
use crate::metrics;
use crate::retry::{backoff_delay, retry_async, RetryConfig};
use crate::sweeper::ArtifactSweeper;

/// Back-off after a failed claim so a down store is not hammered.
const CLAIM_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Everything a slot needs, shared by all slots.
struct SlotContext {
    config: WorkerConfig,
    queue: JobQueue,
    executor: Arc<dyn MediaExecutor>,
    resolver: StorageResolver,
    worker_id: String,
}

/// How an execution attempt ended, before it is reported to the store.
enum Outcome {
    Success(JobResult),
    Failure(WorkerError),
}

/// Fixed-size pool of job slots.
pub struct WorkerPool {
    ctx: Arc<SlotContext>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerConfig,
        queue: JobQueue,
        executor: Arc<dyn MediaExecutor>,
        resolver: StorageResolver,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let worker_id = format!("worker-{}", Uuid::new_v4());

        Self {
            ctx: Arc::new(SlotContext {
                config,
                queue,
                executor,
                resolver,
                worker_id,
            }),
            shutdown,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.ctx.worker_id
    }

    /// Run until [`WorkerPool::shutdown`] is called, then drain.
    ///
    /// In-flight jobs get `shutdown_timeout` to finish. Slots still running
    /// after that are abandoned; their leases expire and the jobs are
    /// recovered by whichever worker runs maintenance next.
    pub async fn run(&self) -> WorkerResult<()> {
        let ctx = &self.ctx;
        info!(
            "Starting worker pool '{}' with {} slots (storage mode: {})",
            ctx.worker_id,
            ctx.config.concurrency,
            ctx.resolver.mode()
        );

        tokio::fs::create_dir_all(&ctx.config.work_dir).await?;

        let mut slots = JoinSet::new();
        for slot in 0..ctx.config.concurrency {
            let ctx = Arc::clone(&self.ctx);
            let shutdown = self.shutdown.subscribe();
            slots.spawn(
                slot_loop(ctx, shutdown).instrument(tracing::info_span!("slot", slot = slot)),
            );
        }

        let mut background = JoinSet::new();
        let maintenance = Maintenance::new(
            Arc::clone(ctx.queue.store()),
            ctx.resolver.mode(),
            ctx.config.maintenance_interval,
        );
        background.spawn(maintenance.run(self.shutdown.subscribe()));

        if ctx.resolver.mode() == StorageMode::Stateless {
            let sweeper = ArtifactSweeper::new(
                ctx.config.work_dir.clone(),
                ctx.queue.config().completed_retention,
                ctx.config.sweep_interval,
            );
            background.spawn(sweeper.run(self.shutdown.subscribe()));
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        let _ = shutdown_rx.wait_for(|stop| *stop).await;

        info!("Shutdown signal received, waiting for in-flight jobs to complete...");
        let drained = tokio::time::timeout(ctx.config.shutdown_timeout, async {
            while slots.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "{} slots still busy after {:?}; abandoning them",
                slots.len(),
                ctx.config.shutdown_timeout
            );
            slots.abort_all();
        }

        background.abort_all();
        while background.join_next().await.is_some() {}

        ctx.queue.close().await?;
        info!("Worker pool '{}' stopped", ctx.worker_id);
        Ok(())
    }

    /// Signal shutdown: slots stop claiming and finish their current job.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn slot_loop(ctx: Arc<SlotContext>, shutdown: watch::Receiver<bool>) {
    let store = Arc::clone(ctx.queue.store());

    // A claim is never cancelled mid-flight: the wait is bounded instead, and
    // shutdown is checked between claims.
    while !*shutdown.borrow() {
        let claimed = store
            .claim(
                &ctx.worker_id,
                ctx.config.claim_wait,
                ctx.config.lease_duration,
            )
            .await;

        match claimed {
            Ok(Some(claimed)) => process_job(&ctx, claimed).await,
            Ok(None) => {}
            Err(QueueError::Closed) => break,
            Err(e) => {
                error!("Failed to claim job: {}", e);
                tokio::time::sleep(CLAIM_ERROR_BACKOFF).await;
            }
        }
    }
    debug!("Slot stopped");
}

/// Execute one claimed job and report its outcome.
async fn process_job(ctx: &SlotContext, claimed: ClaimedJob) {
    let ClaimedJob { job, lease } = claimed;
    let logger = JobLogger::for_job(&job);
    let span = logger.create_span();

    async {
        let started = Instant::now();
        logger.log_start(&format!("attempt {}/{}", job.attempts, job.max_attempts));

        let store = Arc::clone(ctx.queue.store());
        let keeper = LeaseKeeper::start(
            Arc::clone(&store),
            lease.clone(),
            ctx.config.heartbeat_interval,
            ctx.config.lease_duration,
        );

        let outcome = match execute(ctx, &job, &keeper).await {
            Ok(result) => Outcome::Success(result),
            Err(e) => Outcome::Failure(e),
        };
        keeper.stop();

        finalize(ctx, store.as_ref(), &job, &lease, outcome, &logger, started).await;
    }
    .instrument(span)
    .await
}

/// Run the executor and resolve its outputs into a result payload.
///
/// The executor writes into a scratch directory owned by this attempt, and
/// finished outputs are moved up into the work dir. The scratch directory is
/// removed on every exit, including a timeout that drops the executor
/// mid-write.
async fn execute(ctx: &SlotContext, job: &Job, keeper: &LeaseKeeper) -> WorkerResult<JobResult> {
    let options = OperationOptions::parse(job.operation, &job.options)
        .map_err(|e| WorkerError::invalid_job(e.to_string()))?;

    let work_dir = &ctx.config.work_dir;
    let scratch = work_dir.join(format!(
        "{}{}-{}",
        cleanup::ATTEMPT_DIR_PREFIX,
        job.id,
        job.attempts
    ));
    let output = match run_executor(ctx, job, &options, &scratch, keeper).await {
        Ok(MediaOutput::Files(files)) => cleanup::move_files(&files, work_dir)
            .await
            .map(MediaOutput::Files)
            .map_err(WorkerError::from),
        other => other,
    };
    cleanup::remove_dir(&scratch).await;

    match output? {
        MediaOutput::Metadata(info) => Ok(JobResult::probe(ctx.resolver.mode(), info)),
        MediaOutput::Files(files) => resolve_outputs(ctx, job, files).await,
    }
}

async fn run_executor(
    ctx: &SlotContext,
    job: &Job,
    options: &OperationOptions,
    scratch: &Path,
    keeper: &LeaseKeeper,
) -> WorkerResult<MediaOutput> {
    tokio::fs::create_dir_all(scratch).await?;

    let timeout = ctx.config.job_timeout;
    let output = tokio::time::timeout(
        timeout,
        ctx.executor.execute(
            &job.input_path,
            scratch,
            options,
            Some(keeper.progress_callback()),
        ),
    )
    .await
    .map_err(|_| WorkerError::Timeout(timeout))??;

    Ok(output)
}

/// Route produced files through the storage resolver.
///
/// On failure every produced file still on local disk is removed; files
/// uploaded before the failure were already removed by the resolver.
async fn resolve_outputs(
    ctx: &SlotContext,
    job: &Job,
    files: Vec<PathBuf>,
) -> WorkerResult<JobResult> {
    if files.is_empty() {
        return Err(mediaq_media::MediaError::NoOutput(job.input_path.display().to_string()).into());
    }

    let mode = ctx.resolver.mode();
    let started = Instant::now();
    let resolved = if job.operation.is_multi_artifact() {
        ctx.resolver
            .resolve_all(&files)
            .await
            .map(|artifacts| JobResult::multiple(mode, artifacts))
    } else {
        ctx.resolver
            .resolve(&files[0])
            .await
            .map(|artifact| JobResult::single(mode, artifact))
    };

    if mode == StorageMode::ObjectStorage {
        metrics::record_upload(resolved.is_ok(), started.elapsed().as_secs_f64());
    }

    match resolved {
        Ok(result) => {
            // Single-artifact operations only ever produce one file
            if !job.operation.is_multi_artifact() && files.len() > 1 {
                cleanup::remove_files(&files[1..]).await;
            }
            Ok(result)
        }
        Err(e) => {
            cleanup::remove_files(&files).await;
            Err(e.into())
        }
    }
}

/// Report the outcome and apply the cleanup discipline.
///
/// The input is deleted only once the store confirms this attempt's outcome
/// was the one recorded, so it is removed exactly once. A retried job keeps
/// its input.
async fn finalize(
    ctx: &SlotContext,
    store: &dyn JobStore,
    job: &Job,
    lease: &Lease,
    outcome: Outcome,
    logger: &JobLogger,
    started: Instant,
) {
    let report = RetryConfig::new("report_outcome");

    match outcome {
        Outcome::Success(result) => {
            let local_outputs: Vec<PathBuf> =
                result.local_paths().into_iter().cloned().collect();

            let reported =
                retry_async(&report, || store.report_terminal(lease, result.clone())).await;
            match terminal_applied(store, job, &result, reported, logger).await {
                Some(true) => {
                    cleanup::remove_file(&job.input_path).await;
                    metrics::record_job_completed(job.operation, started.elapsed().as_secs_f64());
                    logger.log_completion(&format!("in {:.1}s", started.elapsed().as_secs_f64()));
                }
                Some(false) => {
                    // Recovered while we were running; this result is orphaned
                    logger.log_warning("completion was not recorded; discarding result");
                    cleanup::remove_files(&local_outputs).await;
                }
                // Recovery may still hand the job out again, so the input stays
                None => logger.log_warning("completion state unknown; leaving files in place"),
            }
        }
        Outcome::Failure(err) => {
            let description = err.describe();
            logger.log_error(&description);

            if err.is_retryable() && job.has_attempts_remaining() {
                let delay = backoff_delay(ctx.queue.config().backoff_base, job.attempts);
                match retry_async(&report, || store.retry_later(lease, delay, &description)).await
                {
                    Ok(true) => {
                        metrics::record_job_retried(job.operation);
                        logger.log_progress(&format!("will retry in {delay:?}"));
                    }
                    Ok(false) => logger.log_warning("lease lost before retry was scheduled"),
                    Err(e) => logger.log_error(&format!("failed to schedule retry: {e}")),
                }
                return;
            }

            let result = JobResult::failure(ctx.resolver.mode(), description);
            let reported =
                retry_async(&report, || store.report_terminal(lease, result.clone())).await;
            match terminal_applied(store, job, &result, reported, logger).await {
                Some(true) => {
                    cleanup::remove_file(&job.input_path).await;
                    metrics::record_job_failed(job.operation);
                }
                Some(false) => logger.log_warning("failure was not recorded"),
                None => logger.log_warning("failure state unknown; leaving input in place"),
            }
        }
    }
}

/// Whether a terminal report took effect; `None` when the store cannot say.
///
/// A report can be applied by the store and still come back as an error, or
/// as `Ok(false)` from a retry that found the job already terminal. The
/// stored record settles it: the job is ours if it holds exactly the result
/// we sent.
async fn terminal_applied(
    store: &dyn JobStore,
    job: &Job,
    sent: &JobResult,
    reported: QueueResult<bool>,
    logger: &JobLogger,
) -> Option<bool> {
    match reported {
        Ok(true) => return Some(true),
        Ok(false) => {}
        Err(e) => logger.log_error(&format!("failed to report outcome: {e}")),
    }

    match store.fetch(&job.id).await {
        Ok(stored) => {
            let applied = stored.is_terminal() && stored.result.as_ref() == Some(sent);
            if applied {
                logger.log_warning("outcome was recorded despite an unclear reply");
            }
            Some(applied)
        }
        Err(e) => {
            logger.log_error(&format!("failed to confirm outcome: {e}"));
            None
        }
    }
}
