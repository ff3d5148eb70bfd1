//! Durable job queue for the MediaQ pipeline.
//!
//! This crate provides:
//! - The `JobStore` contract (enqueue, exclusive claim, progress, retry, terminal report)
//! - A Redis store built on hashes, a consumer-group stream and Lua compare-and-swap scripts
//! - An in-memory store for tests and single-process deployments
//! - The validating `JobQueue` facade

pub mod config;
pub mod error;
pub mod memory;
pub mod queue;
pub mod redis_store;
pub mod store;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use memory::MemoryJobStore;
pub use queue::JobQueue;
pub use redis_store::RedisJobStore;
pub use store::{ClaimedJob, JobStore, Lease, RecoveredJob, Recovery};
