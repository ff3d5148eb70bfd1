//! Media job worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mediaq_media::{check_ffmpeg, check_ffprobe, FfmpegExecutor};
use mediaq_queue::{JobQueue, QueueConfig};
use mediaq_storage::{StorageConfig, StorageResolver};
use mediaq_worker::{metrics, WorkerConfig, WorkerPool};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS to Redis and S3)
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting mediaq-worker");

    if let Err(e) = run().await {
        error!("Worker failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mediaq=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if config.metrics_enabled {
        metrics::init_metrics(config.metrics_port).context("failed to start metrics listener")?;
        info!("Prometheus metrics listening on port {}", config.metrics_port);
    }

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    info!("Using {} and {}", ffmpeg.display(), ffprobe.display());

    // Object-storage mode fails here if any S3 setting is missing
    let storage_config = StorageConfig::from_env()?;
    let resolver = StorageResolver::from_config(&storage_config)?;
    resolver
        .check()
        .await
        .context("object storage is not reachable")?;

    let queue_config = QueueConfig::from_env();
    if queue_config.is_in_memory() {
        anyhow::bail!(
            "REDIS_URL=memory:// only works inside the API process; \
             a standalone worker needs a shared Redis queue"
        );
    }
    let queue = JobQueue::connect(queue_config)
        .await
        .context("failed to connect to job queue")?;

    let executor = FfmpegExecutor::new().with_timeout(config.job_timeout);
    let pool = Arc::new(WorkerPool::new(config, queue, Arc::new(executor), resolver));

    let signal_pool = Arc::clone(&pool);
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_pool.shutdown();
    });

    pool.run().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal");
}
