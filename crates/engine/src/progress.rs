use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::encode::Dialect;

// "1234 frames: 25.31 fps, 2450.12 kb/s"
static FRAME_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\D?(\d+).*frames: ([\d.]+) fps, ([\d.]+).*$").expect("valid regex")
});

// "[12.5%] 150/1200 frames, 24.10 fps, 3012.55 kb/s, eta 0:00:43"
static FULL_FRAME_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[[\d.]+?%\] (\d+?)/(\d+?) frames, ([\d.]+?) fps, ([\d.]+?) kb/s.*$")
        .expect("valid regex")
});

// "frame=  150 fps= 24 q=28.0 size=  512kB time=00:00:06.00 bitrate= 699.1kbits/s"
static FFMPEG_FRAME_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*frame=\s*(\d*)\s*fps=\s*([\d.]*).*time=\s*([\d.:]*).*bitrate=\s*([\d.]*).*kbits/s.*$")
        .expect("valid regex")
});

/// One progress sample for the running pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodeProgress {
    pub pass: u8,
    pub current_frame: u64,
    pub total_frames: u64,
    /// Instantaneous rate reported by the encoder.
    pub fps: f64,
    /// Frames encoded divided by wall-clock time, two decimals.
    pub average_fps: f64,
    pub bitrate_kbps: f64,
    pub percent: f64,
    pub elapsed: Duration,
    pub remaining: Duration,
}

pub struct ProgressParser {
    dialect: Dialect,
    pass: u8,
    total_frames: u64,
    remaining: Duration,
}

impl ProgressParser {
    pub fn new(dialect: Dialect, pass: u8, total_frames: u64) -> Self {
        Self {
            dialect,
            pass,
            total_frames,
            remaining: Duration::ZERO,
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Parse one diagnostic line. Lines that are not progress are logged and
    /// yield `None`.
    pub fn parse_line(&mut self, line: &str, elapsed: Duration) -> Option<EncodeProgress> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let sample = match self.dialect {
            Dialect::Native => self.match_native(line),
            Dialect::Embedded => match_embedded(line),
        };

        match sample {
            Some((current, fps, bitrate)) => Some(self.progress(current, fps, bitrate, elapsed)),
            None => {
                info!("{}: {}", self.dialect.tool(), line);
                None
            }
        }
    }

    fn match_native(&mut self, line: &str) -> Option<(u64, f64, f64)> {
        if let Some(caps) = FRAME_INFO.captures(line) {
            return Some((
                caps[1].parse().ok()?,
                caps[2].parse().ok()?,
                caps[3].parse().ok()?,
            ));
        }
        if let Some(caps) = FULL_FRAME_INFO.captures(line) {
            let current = caps[1].parse().ok()?;
            let total: u64 = caps[2].parse().ok()?;
            if total > 0 {
                self.total_frames = total;
            }
            return Some((current, caps[3].parse().ok()?, caps[4].parse().ok()?));
        }
        None
    }

    fn progress(&mut self, current: u64, fps: f64, bitrate: f64, elapsed: Duration) -> EncodeProgress {
        let elapsed_secs = elapsed.as_secs_f64();
        let average_fps = if elapsed_secs > 0.0 {
            (current as f64 / elapsed_secs * 100.0).round() / 100.0
        } else {
            0.0
        };

        // Below one frame per second the estimate is noise; keep the last one
        if average_fps > 1.0 {
            let left = self.total_frames.saturating_sub(current) as f64;
            self.remaining = Duration::from_secs_f64(left / average_fps);
        }

        let percent = if self.total_frames > 0 {
            current as f64 / self.total_frames as f64 * 100.0
        } else {
            0.0
        };

        EncodeProgress {
            pass: self.pass,
            current_frame: current,
            total_frames: self.total_frames,
            fps,
            average_fps,
            bitrate_kbps: bitrate,
            percent,
            elapsed,
            remaining: self.remaining,
        }
    }
}

fn match_embedded(line: &str) -> Option<(u64, f64, f64)> {
    let caps = FFMPEG_FRAME_INFO.captures(line)?;
    Some((
        caps[1].parse().ok()?,
        caps[2].parse().unwrap_or(0.0),
        caps[4].parse().unwrap_or(0.0),
    ))
}

/// Splits a byte stream into lines on `\n` and on bare `\r`, which both
/// encoders use to redraw their status line in place.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                if !self.pending.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Whatever is left once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}
