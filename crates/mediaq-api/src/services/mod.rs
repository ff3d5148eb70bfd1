//! Business logic services.

pub mod job_status;

pub use job_status::{Artifact, JobStatusService, JobStatusView};
