//! FFmpeg CLI wrapper for the MediaQ operations.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Timeout-bounded process execution
//! - The `MediaExecutor` seam and its FFmpeg implementation

pub mod command;
pub mod error;
pub mod executor;
pub mod operations;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use executor::{FfmpegExecutor, MediaExecutor, MediaOutput};
pub use probe::probe_media;
pub use progress::{FfmpegProgress, ProgressCallback};
