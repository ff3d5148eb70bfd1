//! Typed options for each operation kind.
//!
//! Submitters send options as an opaque JSON object. The queue validates them
//! against the typed form here before accepting a job, and the executor parses
//! the same form again when it runs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::OperationKind;

/// Default timestamp for a single-frame extraction.
pub const DEFAULT_FRAME_TIMESTAMP: &str = "00:00:01";

/// Default video codec for MP4 conversion.
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";

/// Errors raised while validating submitted options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("Malformed options for {kind}: {message}")]
    Malformed { kind: OperationKind, message: String },

    #[error("Invalid options for {kind}: {message}")]
    Invalid { kind: OperationKind, message: String },
}

impl OptionsError {
    fn malformed(kind: OperationKind, message: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            message: message.into(),
        }
    }

    fn invalid(kind: OperationKind, message: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            message: message.into(),
        }
    }
}

/// Options for `video-convert`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VideoConvertOptions {
    /// Video codec (default: libx264)
    #[validate(length(min = 1, max = 64))]
    pub codec: Option<String>,
    /// Video bitrate, e.g. "1500k"
    pub video_bitrate: Option<String>,
    /// Audio bitrate, e.g. "128k"
    pub audio_bitrate: Option<String>,
    /// Output frame rate
    #[validate(range(min = 1.0, max = 240.0))]
    pub fps: Option<f64>,
    /// Output size as "WIDTHxHEIGHT"
    pub resolution: Option<String>,
}

impl VideoConvertOptions {
    pub fn codec(&self) -> &str {
        self.codec.as_deref().unwrap_or(DEFAULT_VIDEO_CODEC)
    }
}

/// Options for `audio-extract`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AudioExtractOptions {
    /// Zero-based audio track index
    #[validate(range(max = 64))]
    pub track: Option<u32>,
    /// Output channel count
    #[validate(range(min = 1, max = 2))]
    pub channels: Option<u8>,
}

/// How frames are selected for `frame-extract`.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSelection {
    /// A single frame at the given timestamp
    At(String),
    /// `n` frames spread evenly across the input
    Count(u32),
    /// Frames sampled at a fixed rate
    Rate(f64),
}

/// Options for `frame-extract`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FrameExtractOptions {
    /// Timestamp of a single frame ("HH:MM:SS[.mmm]" or seconds)
    pub timestamp: Option<String>,
    /// Number of evenly spaced frames
    #[validate(range(min = 1, max = 500))]
    pub count: Option<u32>,
    /// Sampling rate in frames per second
    #[validate(range(min = 0.01, max = 60.0))]
    pub fps: Option<f64>,
}

impl FrameExtractOptions {
    /// Resolve the selection mode; a single frame at 00:00:01 when nothing is set.
    pub fn selection(&self) -> FrameSelection {
        if let Some(ts) = &self.timestamp {
            FrameSelection::At(ts.clone())
        } else if let Some(count) = self.count {
            FrameSelection::Count(count)
        } else if let Some(fps) = self.fps {
            FrameSelection::Rate(fps)
        } else {
            FrameSelection::At(DEFAULT_FRAME_TIMESTAMP.to_string())
        }
    }
}

/// Target format for `audio-convert`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }
}

/// Options for `audio-convert`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AudioConvertOptions {
    /// Output format (default: mp3)
    #[serde(default)]
    pub format: AudioFormat,
    /// Audio bitrate, e.g. "192k"
    pub bitrate: Option<String>,
    /// Sample rate in Hz
    #[validate(range(min = 8000, max = 192000))]
    pub sample_rate: Option<u32>,
}

/// Options for `image-convert`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImageConvertOptions {
    /// JPEG quality scale (2 = best, 31 = worst)
    #[validate(range(min = 2, max = 31))]
    pub quality: Option<u8>,
}

/// Typed options, one variant per operation kind.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOptions {
    VideoConvert(VideoConvertOptions),
    AudioExtract(AudioExtractOptions),
    FrameExtract(FrameExtractOptions),
    AudioConvert(AudioConvertOptions),
    ImageConvert(ImageConvertOptions),
    Probe,
}

impl OperationOptions {
    /// Parse and validate raw options for `kind`.
    ///
    /// `null` and `{}` both mean "all defaults".
    pub fn parse(kind: OperationKind, raw: &serde_json::Value) -> Result<Self, OptionsError> {
        let raw = match raw {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            serde_json::Value::Object(_) => raw.clone(),
            _ => return Err(OptionsError::malformed(kind, "options must be a JSON object")),
        };

        let options = match kind {
            OperationKind::VideoConvert => {
                let opts: VideoConvertOptions = decode(kind, raw)?;
                check_bitrate(kind, "videoBitrate", opts.video_bitrate.as_deref())?;
                check_bitrate(kind, "audioBitrate", opts.audio_bitrate.as_deref())?;
                if let Some(res) = opts.resolution.as_deref() {
                    if !is_resolution(res) {
                        return Err(OptionsError::invalid(
                            kind,
                            format!("resolution must look like 1280x720, got {res:?}"),
                        ));
                    }
                }
                OperationOptions::VideoConvert(opts)
            }
            OperationKind::AudioExtract => OperationOptions::AudioExtract(decode(kind, raw)?),
            OperationKind::FrameExtract => {
                let opts: FrameExtractOptions = decode(kind, raw)?;
                let selectors = [opts.timestamp.is_some(), opts.count.is_some(), opts.fps.is_some()]
                    .into_iter()
                    .filter(|set| *set)
                    .count();
                if selectors > 1 {
                    return Err(OptionsError::invalid(
                        kind,
                        "only one of timestamp, count or fps may be set",
                    ));
                }
                if let Some(ts) = opts.timestamp.as_deref() {
                    if !is_timestamp(ts) {
                        return Err(OptionsError::invalid(kind, format!("bad timestamp {ts:?}")));
                    }
                }
                OperationOptions::FrameExtract(opts)
            }
            OperationKind::AudioConvert => {
                let opts: AudioConvertOptions = decode(kind, raw)?;
                check_bitrate(kind, "bitrate", opts.bitrate.as_deref())?;
                OperationOptions::AudioConvert(opts)
            }
            OperationKind::ImageConvert => OperationOptions::ImageConvert(decode(kind, raw)?),
            OperationKind::Probe => {
                if raw.as_object().is_some_and(|o| !o.is_empty()) {
                    return Err(OptionsError::invalid(kind, "probe takes no options"));
                }
                OperationOptions::Probe
            }
        };

        Ok(options)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            OperationOptions::VideoConvert(_) => OperationKind::VideoConvert,
            OperationOptions::AudioExtract(_) => OperationKind::AudioExtract,
            OperationOptions::FrameExtract(_) => OperationKind::FrameExtract,
            OperationOptions::AudioConvert(_) => OperationKind::AudioConvert,
            OperationOptions::ImageConvert(_) => OperationKind::ImageConvert,
            OperationOptions::Probe => OperationKind::Probe,
        }
    }
}

fn decode<T>(kind: OperationKind, raw: serde_json::Value) -> Result<T, OptionsError>
where
    T: DeserializeOwned + Validate,
{
    let opts: T =
        serde_json::from_value(raw).map_err(|e| OptionsError::malformed(kind, e.to_string()))?;
    opts.validate()
        .map_err(|e| OptionsError::invalid(kind, e.to_string()))?;
    Ok(opts)
}

fn check_bitrate(kind: OperationKind, field: &str, value: Option<&str>) -> Result<(), OptionsError> {
    match value {
        Some(v) if !is_bitrate(v) => Err(OptionsError::invalid(
            kind,
            format!("{field} must look like 128k or 2M, got {v:?}"),
        )),
        _ => Ok(()),
    }
}

/// "128k", "2M", "320000".
fn is_bitrate(value: &str) -> bool {
    let digits = value.trim_end_matches(['k', 'K', 'm', 'M']);
    !digits.is_empty()
        && digits.len() + 1 >= value.len()
        && digits.chars().all(|c| c.is_ascii_digit())
}

/// "1280x720".
fn is_resolution(value: &str) -> bool {
    value.split_once('x').is_some_and(|(w, h)| {
        !w.is_empty()
            && !h.is_empty()
            && w.chars().all(|c| c.is_ascii_digit())
            && h.chars().all(|c| c.is_ascii_digit())
    })
}

/// "HH:MM:SS", "MM:SS", "SS", each with optional fractional seconds.
fn is_timestamp(value: &str) -> bool {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() > 3 {
        return false;
    }
    let Some((last, init)) = parts.split_last() else {
        return false;
    };
    init.iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
        && last.parse::<f64>().is_ok_and(|s| s >= 0.0)
}
