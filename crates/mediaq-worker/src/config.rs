//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent job slots
    pub concurrency: usize,
    /// Upper bound on a single execution; expiry counts as an executor failure
    pub job_timeout: Duration,
    /// Interval for extending the lease of a held job
    pub heartbeat_interval: Duration,
    /// Lease length; a job not heartbeated for this long is recovered
    pub lease_duration: Duration,
    /// How long a slot blocks waiting for a job before re-checking shutdown
    pub claim_wait: Duration,
    /// Interval for promoting backed-off jobs and recovering stalled ones
    pub maintenance_interval: Duration,
    /// Interval for sweeping expired stateless artifacts
    pub sweep_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Directory the executor writes outputs to
    pub work_dir: PathBuf,
    /// Whether to expose Prometheus metrics
    pub metrics_enabled: bool,
    /// Port of the standalone worker's metrics listener
    pub metrics_port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            job_timeout: Duration::from_secs(3600), // 1 hour
            heartbeat_interval: Duration::from_secs(30),
            lease_duration: Duration::from_secs(300), // 5 minutes
            claim_wait: Duration::from_secs(1),
            maintenance_interval: Duration::from_millis(1000),
            sweep_interval: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(60),
            work_dir: PathBuf::from("./temp"),
            metrics_enabled: true,
            metrics_port: 9091,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.concurrency),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(30),
            ),
            lease_duration: Duration::from_secs(
                std::env::var("WORKER_STALL_AFTER_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(300),
            ),
            claim_wait: defaults.claim_wait,
            maintenance_interval: Duration::from_millis(
                std::env::var("WORKER_MAINTENANCE_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(1000),
            ),
            sweep_interval: Duration::from_secs(
                std::env::var("WORKER_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(300),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            metrics_port: std::env::var("WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.metrics_port),
        }
    }
}
