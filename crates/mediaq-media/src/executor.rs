//! Media operation executor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mediaq_models::{FrameExtractOptions, FrameSelection, MediaInfo, OperationOptions};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::operations;
use crate::probe::{duration_ms, probe_media};
use crate::progress::ProgressCallback;

/// What an operation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaOutput {
    /// Output files, in production order
    Files(Vec<PathBuf>),
    /// Probe metadata
    Metadata(MediaInfo),
}

impl MediaOutput {
    pub fn files(&self) -> &[PathBuf] {
        match self {
            MediaOutput::Files(files) => files,
            MediaOutput::Metadata(_) => &[],
        }
    }
}

/// Runs one media operation against a staged input.
#[async_trait]
pub trait MediaExecutor: Send + Sync {
    /// Every file the operation writes, partial or not, lands in `output_dir`.
    async fn execute(
        &self,
        input: &Path,
        output_dir: &Path,
        options: &OperationOptions,
        progress: Option<ProgressCallback>,
    ) -> MediaResult<MediaOutput>;
}

/// FFmpeg-backed executor.
#[derive(Debug, Clone, Default)]
pub struct FfmpegExecutor {
    runner: FfmpegRunner,
}

impl FfmpegExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any single FFmpeg invocation running longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    /// Run a single-output command, removing any partial output on failure.
    async fn run_single(
        &self,
        input: &Path,
        cmd: FfmpegCommand,
        progress: Option<ProgressCallback>,
    ) -> MediaResult<MediaOutput> {
        let output = cmd.output().to_path_buf();

        let result = match progress {
            Some(progress) => {
                let total_ms = duration_ms(input).await.unwrap_or(0);
                self.runner
                    .run_with_progress(&cmd, move |p| {
                        if let Some(pct) = p.percentage(total_ms) {
                            progress(pct);
                        }
                    })
                    .await
            }
            None => self.runner.run(&cmd).await,
        };

        if let Err(e) = result {
            remove_quietly(&output).await;
            return Err(e);
        }

        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(MediaError::NoOutput(output.display().to_string()));
        }

        Ok(MediaOutput::Files(vec![output]))
    }

    async fn extract_frames(
        &self,
        input: &Path,
        output_dir: &Path,
        opts: &FrameExtractOptions,
        progress: Option<ProgressCallback>,
    ) -> MediaResult<MediaOutput> {
        match opts.selection() {
            FrameSelection::At(position) => {
                let cmd = operations::frame_at(input, &output_path(output_dir, "jpg"), &position);
                self.run_single(input, cmd, None).await
            }
            FrameSelection::Count(count) => {
                let total_ms = duration_ms(input).await.ok_or_else(|| {
                    MediaError::InvalidOptions(
                        "cannot determine input duration for count-based extraction".into(),
                    )
                })?;
                let positions = operations::evenly_spaced(total_ms as f64 / 1000.0, count);

                let mut frames = Vec::with_capacity(positions.len());
                for (i, position) in positions.iter().enumerate() {
                    let output = output_path(output_dir, "jpg");
                    let cmd = operations::frame_at(input, &output, position);
                    if let Err(e) = self.runner.run(&cmd).await {
                        // Partial frames must not leak
                        frames.push(output);
                        remove_all(&frames).await;
                        return Err(e);
                    }
                    frames.push(output);
                    if let Some(progress) = &progress {
                        progress((((i + 1) * 100) / positions.len()) as u8);
                    }
                }
                Ok(MediaOutput::Files(frames))
            }
            FrameSelection::Rate(fps) => {
                let prefix = Uuid::new_v4().to_string();
                let pattern = output_dir.join(format!("{prefix}-%04d.jpg"));
                let cmd = operations::frames_at_rate(input, &pattern, fps);

                let result = self.runner.run(&cmd).await;
                let frames = list_frames(output_dir, &prefix).await?;

                if let Err(e) = result {
                    remove_all(&frames).await;
                    return Err(e);
                }
                if frames.is_empty() {
                    return Err(MediaError::NoOutput(format!(
                        "no frames extracted at {fps} fps"
                    )));
                }
                Ok(MediaOutput::Files(frames))
            }
        }
    }
}

#[async_trait]
impl MediaExecutor for FfmpegExecutor {
    async fn execute(
        &self,
        input: &Path,
        output_dir: &Path,
        options: &OperationOptions,
        progress: Option<ProgressCallback>,
    ) -> MediaResult<MediaOutput> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        info!(operation = %options.kind(), input = %input.display(), "Executing media operation");

        let output = match options {
            OperationOptions::VideoConvert(opts) => {
                let cmd = operations::video_convert(input, &output_path(output_dir, "mp4"), opts);
                self.run_single(input, cmd, progress).await?
            }
            OperationOptions::AudioExtract(opts) => {
                let cmd = operations::audio_extract(input, &output_path(output_dir, "mp3"), opts);
                self.run_single(input, cmd, progress).await?
            }
            OperationOptions::AudioConvert(opts) => {
                let output = output_path(output_dir, opts.format.extension());
                let cmd = operations::audio_convert(input, &output, opts);
                self.run_single(input, cmd, progress).await?
            }
            OperationOptions::ImageConvert(opts) => {
                let cmd = operations::image_convert(input, &output_path(output_dir, "jpg"), opts);
                self.run_single(input, cmd, None).await?
            }
            OperationOptions::FrameExtract(opts) => {
                self.extract_frames(input, output_dir, opts, progress).await?
            }
            OperationOptions::Probe => MediaOutput::Metadata(probe_media(input).await?),
        };

        debug!(outputs = output.files().len(), "Media operation finished");
        Ok(output)
    }
}

fn output_path(dir: &Path, extension: &str) -> PathBuf {
    dir.join(format!("{}.{extension}", Uuid::new_v4()))
}

/// Frames written for `prefix`, in sequence order.
async fn list_frames(dir: &Path, prefix: &str) -> MediaResult<Vec<PathBuf>> {
    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    let wanted = format!("{prefix}-");

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&wanted) && name.ends_with(".jpg") {
            frames.push(entry.path());
        }
    }

    // Zero-padded sequence numbers sort lexically
    frames.sort();
    Ok(frames)
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

async fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        remove_quietly(path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let executor = FfmpegExecutor::new();
        let err = executor
            .execute(
                Path::new("/nonexistent/in.mp4"),
                dir.path(),
                &OperationOptions::Probe,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_frames_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["abc-0002.jpg", "abc-0001.jpg", "other-0001.jpg", "abc-0003.png"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        let frames = list_frames(dir.path(), "abc").await.unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["abc-0001.jpg", "abc-0002.jpg"]);
    }

    #[tokio::test]
    async fn test_remove_all_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.jpg");
        tokio::fs::write(&present, b"x").await.unwrap();

        remove_all(&[present.clone(), dir.path().join("missing.jpg")]).await;
        assert!(!present.exists());
    }
}
