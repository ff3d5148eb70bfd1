//! Command builders for each operation kind.

use std::path::Path;

use mediaq_models::{
    AudioConvertOptions, AudioExtractOptions, AudioFormat, ImageConvertOptions,
    VideoConvertOptions,
};

use crate::command::FfmpegCommand;

/// Transcode to MP4.
pub fn video_convert(input: &Path, output: &Path, opts: &VideoConvertOptions) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .video_codec(opts.codec())
        .output_opt("-b:v", opts.video_bitrate.as_deref())
        .output_opt("-b:a", opts.audio_bitrate.as_deref())
        .output_opt("-r", opts.fps)
        .output_opt("-s", opts.resolution.as_deref())
        .output_arg("-movflags")
        .output_arg("+faststart")
}

/// Extract an audio track to MP3.
pub fn audio_extract(input: &Path, output: &Path, opts: &AudioExtractOptions) -> FfmpegCommand {
    let track = opts.track.unwrap_or(0);
    FfmpegCommand::new(input, output)
        .no_video()
        .output_arg("-map")
        .output_arg(format!("0:a:{track}"))
        .audio_codec("libmp3lame")
        .output_opt("-ac", opts.channels)
}

/// Convert audio between MP3 and WAV.
pub fn audio_convert(input: &Path, output: &Path, opts: &AudioConvertOptions) -> FfmpegCommand {
    let codec = match opts.format {
        AudioFormat::Mp3 => "libmp3lame",
        AudioFormat::Wav => "pcm_s16le",
    };
    FfmpegCommand::new(input, output)
        .no_video()
        .audio_codec(codec)
        .output_opt("-b:a", opts.bitrate.as_deref())
        .output_opt("-ar", opts.sample_rate)
}

/// Convert an image to JPEG.
pub fn image_convert(input: &Path, output: &Path, opts: &ImageConvertOptions) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .single_frame()
        .output_opt("-q:v", opts.quality)
}

/// Grab one frame at `position`.
pub fn frame_at(input: &Path, output: &Path, position: &str) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .seek(position)
        .single_frame()
        .output_arg("-q:v")
        .output_arg("2")
}

/// Sample frames at `fps` into an image2 pattern.
pub fn frames_at_rate(input: &Path, pattern: &Path, fps: f64) -> FfmpegCommand {
    FfmpegCommand::new(input, pattern)
        .video_filter(format!("fps={fps}"))
        .output_arg("-q:v")
        .output_arg("2")
}

/// Positions (seconds) of `count` frames spread evenly across `duration_secs`,
/// excluding both ends.
pub fn evenly_spaced(duration_secs: f64, count: u32) -> Vec<String> {
    (1..=count)
        .map(|i| {
            let t = duration_secs * f64::from(i) / f64::from(count + 1);
            format!("{t:.3}")
        })
        .collect()
}
