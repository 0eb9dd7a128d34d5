use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::process::Command;

use crate::stream::StreamGeometry;

// Public API types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub format: FormatInfo,
    pub video_streams: Vec<VideoStream>,
}

impl ProbeResult {
    /// Get the main video stream (prefers default, falls back to first)
    pub fn main_video_stream(&self) -> Option<&VideoStream> {
        select_main_video_stream(&self.video_streams)
    }

    /// Refresh `geometry` from the main video stream. Fields the probe did
    /// not report keep their previous values.
    pub fn apply_to(&self, geometry: &mut StreamGeometry) {
        let Some(stream) = self.main_video_stream() else {
            return;
        };
        if stream.width > 0 && stream.height > 0 {
            geometry.width = stream.width;
            geometry.height = stream.height;
        }
        if let Some((num, den)) = stream.frame_rate.as_deref().and_then(parse_frame_rate) {
            geometry.fps_num = num;
            geometry.fps_den = den;
        }
        if let Some(frames) = stream.frame_count {
            geometry.frame_count = frames;
        }
        if let Some(aspect) = stream.display_aspect.as_deref().and_then(parse_aspect) {
            geometry.aspect_ratio = aspect;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatInfo {
    pub duration: Option<f64>,
    pub size: u64,
    pub bitrate: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoStream {
    pub index: usize,
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: Option<u64>,
    pub frame_rate: Option<String>,
    pub frame_count: Option<u64>,
    pub display_aspect: Option<String>,
    pub is_default: bool,
}

// Internal FFprobe JSON structures
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    width: Option<u32>,
    height: Option<u32>,
    bit_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    display_aspect_ratio: Option<String>,
    disposition: Option<FfprobeDisposition>,
}

#[derive(Debug, Deserialize)]
struct FfprobeDisposition {
    default: Option<i32>,
}

pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<ProbeResult>> + Send + 'a>>;

/// Media-info collaborator run on the produced stream after the final pass.
pub trait MediaProbe: Send + Sync {
    fn probe<'a>(&'a self, path: &'a Path) -> ProbeFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: PathBuf,
}

impl FfprobeProbe {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new(PathBuf::from("ffprobe"))
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe<'a>(&'a self, path: &'a Path) -> ProbeFuture<'a> {
        Box::pin(probe_file(&self.program, path))
    }
}

/// Execute ffprobe on a file and parse the JSON output
pub async fn probe_file(ffprobe: &Path, path: &Path) -> Result<ProbeResult> {
    let output = Command::new(ffprobe)
        .arg("-v")
        .arg("quiet")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(path)
        .output()
        .await
        .context("Failed to execute ffprobe")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffprobe failed: {}", stderr);
    }

    let stdout = String::from_utf8(output.stdout).context("ffprobe output is not valid UTF-8")?;
    parse_probe_json(&stdout)
}

pub fn parse_probe_json(json: &str) -> Result<ProbeResult> {
    let ffprobe_output: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON output")?;
    Ok(parse_ffprobe_output(ffprobe_output))
}

fn parse_ffprobe_output(output: FfprobeOutput) -> ProbeResult {
    let format = if let Some(fmt) = output.format {
        FormatInfo {
            duration: fmt.duration.and_then(|d| d.parse::<f64>().ok()),
            size: fmt.size.and_then(|s| s.parse::<u64>().ok()).unwrap_or(0),
            bitrate: fmt.bit_rate.and_then(|b| b.parse::<u64>().ok()),
        }
    } else {
        FormatInfo {
            duration: None,
            size: 0,
            bitrate: None,
        }
    };

    let video_streams = output
        .streams
        .unwrap_or_default()
        .into_iter()
        .filter(|stream| stream.codec_type == "video")
        .filter_map(|stream| {
            let (width, height) = (stream.width?, stream.height?);
            Some(VideoStream {
                index: stream.index,
                codec_name: stream.codec_name,
                width,
                height,
                bitrate: stream.bit_rate.and_then(|b| b.parse::<u64>().ok()),
                frame_rate: stream.r_frame_rate,
                frame_count: stream.nb_frames.and_then(|n| n.parse::<u64>().ok()),
                display_aspect: stream.display_aspect_ratio,
                is_default: stream
                    .disposition
                    .and_then(|d| d.default)
                    .map(|v| v == 1)
                    .unwrap_or(false),
            })
        })
        .collect();

    ProbeResult {
        format,
        video_streams,
    }
}

/// Select the main video stream from a list of video streams
/// Prefers stream with default disposition, falls back to first stream
pub fn select_main_video_stream(streams: &[VideoStream]) -> Option<&VideoStream> {
    if let Some(default_stream) = streams.iter().find(|s| s.is_default) {
        return Some(default_stream);
    }
    streams.first()
}

/// "30000/1001" → (30000, 1001). Zero terms are rejected.
pub fn parse_frame_rate(rate: &str) -> Option<(u32, u32)> {
    let (num, den) = rate.split_once('/')?;
    let num: u32 = num.trim().parse().ok()?;
    let den: u32 = den.trim().parse().ok()?;
    (num > 0 && den > 0).then_some((num, den))
}

/// "16:9" → 1.777…
fn parse_aspect(aspect: &str) -> Option<f64> {
    let (x, y) = aspect.split_once(':')?;
    let x: f64 = x.trim().parse().ok()?;
    let y: f64 = y.trim().parse().ok()?;
    (x > 0.0 && y > 0.0).then(|| x / y)
}
