//! Operation kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of media transformation requested by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Transcode a video to MP4
    VideoConvert,
    /// Extract the audio track as MP3
    AudioExtract,
    /// Extract one or more still frames as JPEG
    FrameExtract,
    /// Convert audio between MP3 and WAV
    AudioConvert,
    /// Convert an image to JPEG
    ImageConvert,
    /// Read container and stream metadata
    Probe,
}

/// Error for an operation name that is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown operation kind: {0}")]
pub struct UnknownOperation(pub String);

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::VideoConvert,
        OperationKind::AudioExtract,
        OperationKind::FrameExtract,
        OperationKind::AudioConvert,
        OperationKind::ImageConvert,
        OperationKind::Probe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::VideoConvert => "video-convert",
            OperationKind::AudioExtract => "audio-extract",
            OperationKind::FrameExtract => "frame-extract",
            OperationKind::AudioConvert => "audio-convert",
            OperationKind::ImageConvert => "image-convert",
            OperationKind::Probe => "probe",
        }
    }

    /// Whether the operation produces storable files (probe only yields metadata).
    pub fn produces_artifacts(&self) -> bool {
        !matches!(self, OperationKind::Probe)
    }

    /// Whether the operation yields an ordered list of artifacts.
    pub fn is_multi_artifact(&self) -> bool {
        matches!(self, OperationKind::FrameExtract)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}
