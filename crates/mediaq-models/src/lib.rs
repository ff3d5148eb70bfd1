//! Shared data models for the MediaQ job pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job ids and the job state machine
//! - Operation kinds and their typed options
//! - Result payloads and storage modes
//! - Media probe metadata

pub mod job;
pub mod media_info;
pub mod operation;
pub mod options;
pub mod result;

// Re-export common types
pub use job::{Job, JobId, JobState, DEFAULT_MAX_ATTEMPTS};
pub use media_info::{FormatInfo, MediaInfo, StreamInfo};
pub use operation::{OperationKind, UnknownOperation};
pub use options::{
    AudioConvertOptions, AudioExtractOptions, AudioFormat, FrameExtractOptions, FrameSelection,
    ImageConvertOptions, OperationOptions, OptionsError, VideoConvertOptions,
};
pub use result::{JobResult, StorageMode, StoredArtifact};
