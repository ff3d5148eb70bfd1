//! Axum HTTP API server.
//!
//! This crate provides:
//! - Multipart job submission for each media operation
//! - Job status polling and artifact download
//! - Health, readiness and Prometheus metrics endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod upload;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::JobStatusService;
pub use state::AppState;
