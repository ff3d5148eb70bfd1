//! FFprobe media information.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use mediaq_models::{FormatInfo, MediaInfo, StreamInfo};

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    filename: Option<String>,
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

/// Probe a media file for container and stream information.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Input duration in milliseconds, when FFprobe can tell.
pub async fn duration_ms(path: impl AsRef<Path>) -> Option<i64> {
    let info = probe_media(path).await.ok()?;
    (info.format.duration > 0.0).then(|| (info.format.duration * 1000.0) as i64)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let format = FormatInfo {
        filename: probe.format.filename.unwrap_or_default(),
        format_name: probe.format.format_name.unwrap_or_default(),
        duration: parse_num(probe.format.duration.as_deref()).unwrap_or(0.0),
        size: parse_num(probe.format.size.as_deref()).unwrap_or(0),
        bit_rate: parse_num(probe.format.bit_rate.as_deref()).unwrap_or(0),
    };

    let streams = probe
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            codec_type: s.codec_type.unwrap_or_default(),
            codec_name: s.codec_name.unwrap_or_default(),
            width: s.width,
            height: s.height,
            sample_rate: parse_num(s.sample_rate.as_deref()),
            channels: s.channels,
        })
        .collect();

    Ok(MediaInfo { format, streams })
}

fn parse_num<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}
