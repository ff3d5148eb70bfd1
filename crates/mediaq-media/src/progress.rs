//! FFmpeg progress parsing.

use std::sync::Arc;

/// Progress snapshot from FFmpeg's `-progress pipe:2` output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Progress percentage given the input duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> Option<u8> {
        if self.is_complete {
            return Some(100);
        }
        if total_duration_ms <= 0 {
            return None;
        }
        let pct = (self.out_time_ms as f64 / total_duration_ms as f64) * 100.0;
        Some(pct.clamp(0.0, 100.0) as u8)
    }

    /// Feed one line of progress output.
    ///
    /// Returns a snapshot at the end of each `progress=` block.
    pub fn parse_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_us" | "out_time_ms" => {
                // FFmpeg reports microseconds under both keys
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    self.is_complete = true;
                }
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }
}

/// Receives percentage updates (0..=100) while an operation runs.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };

        assert_eq!(progress.percentage(10000), Some(50));
        assert_eq!(progress.percentage(2500), Some(100));
        assert_eq!(progress.percentage(0), None);
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(progress.parse_line("frame=42").is_none());
        progress.parse_line("out_time_us=5000000");
        assert_eq!(progress.out_time_ms, 5000);

        progress.parse_line("speed=1.5x");
        assert!((progress.speed - 1.5).abs() < 0.01);
        progress.parse_line("speed=N/A");
        assert!((progress.speed - 1.5).abs() < 0.01);

        let snapshot = progress.parse_line("progress=continue").unwrap();
        assert_eq!(snapshot.frame, 42);
        assert!(!snapshot.is_complete);

        let end = progress.parse_line("progress=end").unwrap();
        assert!(end.is_complete);
        assert_eq!(end.percentage(0), Some(100));
    }
}
