//! Media job worker.
//!
//! This crate provides:
//! - A fixed-size pool of job slots (claim → execute → finalize)
//! - Exponential retry backoff and the input/output cleanup discipline
//! - Lease heartbeats, stalled-job recovery and delayed-job promotion
//! - The stateless artifact sweeper
//! - Graceful drain on shutdown

pub mod cleanup;
pub mod config;
pub mod error;
pub mod lease;
pub mod logging;
pub mod maintenance;
pub mod metrics;
pub mod pool;
pub mod retry;
pub mod sweeper;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use maintenance::Maintenance;
pub use pool::WorkerPool;
pub use sweeper::ArtifactSweeper;
