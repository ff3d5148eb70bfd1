//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mediaq_api::{create_router, metrics, ApiConfig, AppState};
use mediaq_media::FfmpegExecutor;
use mediaq_queue::{JobQueue, QueueConfig};
use mediaq_storage::{StorageConfig, StorageResolver};
use mediaq_worker::{WorkerConfig, WorkerPool};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    let _ = rustls::crypto::ring::default_provider().install_default();

    init_tracing();

    info!("Starting mediaq-api");

    if let Err(e) = run().await {
        error!("API server failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
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
    // Load configuration
    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let storage_config = StorageConfig::from_env()?;
    let storage = StorageResolver::from_config(&storage_config)?;
    info!("Storage mode: {}", storage.mode());

    let queue_config = QueueConfig::from_env();
    let embedded = config.runs_embedded_workers(&queue_config);
    let queue = JobQueue::connect(queue_config)
        .await
        .context("failed to connect to job queue")?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;

    // Initialize metrics
    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install metrics recorder")?)
    } else {
        None
    };

    // Workers sharing this process (always the case with the in-memory store)
    let workers = if embedded {
        let worker_config = WorkerConfig::from_env();
        info!("Starting {} embedded workers", worker_config.concurrency);
        let executor = FfmpegExecutor::new().with_timeout(worker_config.job_timeout);
        let pool = Arc::new(WorkerPool::new(
            worker_config,
            queue.clone(),
            Arc::new(executor),
            storage.clone(),
        ));
        let runner = Arc::clone(&pool);
        let handle = tokio::spawn(async move {
            if let Err(e) = runner.run().await {
                error!("Embedded worker pool failed: {}", e);
            }
        });
        Some((pool, handle))
    } else {
        None
    };

    let app = create_router(AppState::new(config.clone(), queue, storage), metrics_handle);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some((pool, handle)) = workers {
        pool.shutdown();
        if let Err(e) = handle.await {
            warn!("Embedded worker pool task ended abnormally: {}", e);
        }
    }

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
