use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::stream::{CropRect, StreamGeometry};

/// A ready-to-start external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ProcessSpec {
    /// The command line as it is logged.
    pub fn display(&self) -> String {
        let name = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{} {}", name, self.args.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeRequest {
    pub input: PathBuf,
    /// Storage size of the source widened to its display aspect.
    pub original_size: (u32, u32),
    pub target_size: (u32, u32),
    pub crop: CropRect,
    pub aspect_ratio: f64,
    /// Let the decoder crop and scale instead of the upstream script.
    pub scale: bool,
    pub pipe: PathBuf,
}

/// Builds the process that decodes the input artifact into the decode pipe.
pub trait DecoderFactory: Send + Sync {
    fn decode_process(&self, request: &DecodeRequest) -> ProcessSpec;
}

/// Decodes through ffmpeg into a yuv4mpeg stream.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    program: PathBuf,
}

impl FfmpegDecoder {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.tool_path("ffmpeg", config.use_64bit_encoder()))
    }
}

impl DecoderFactory for FfmpegDecoder {
    fn decode_process(&self, request: &DecodeRequest) -> ProcessSpec {
        let mut args: Vec<String> = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            request.input.to_string_lossy().into_owned(),
        ];

        let filters = video_filters(request);
        if !filters.is_empty() {
            args.push("-vf".to_string());
            args.push(filters.join(","));
        }

        args.extend(
            ["-an", "-sn", "-f", "yuv4mpegpipe", "-pix_fmt", "yuv420p", "-y"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(request.pipe.to_string_lossy().into_owned());

        ProcessSpec {
            program: self.program.clone(),
            args,
        }
    }
}

fn video_filters(request: &DecodeRequest) -> Vec<String> {
    if !request.scale {
        return Vec::new();
    }

    let mut filters = Vec::new();
    let (mut width, mut height) = request.original_size;
    filters.push(format!("scale={}:{}", width, height));

    let crop = &request.crop;
    if !crop.is_empty() {
        width = width.saturating_sub(crop.left + crop.right);
        height = height.saturating_sub(crop.top + crop.bottom);
        filters.push(format!("crop={}:{}:{}:{}", width, height, crop.left, crop.top));
    }

    let (target_width, target_height) = request.target_size;
    if target_width > 0 && target_height > 0 && (target_width, target_height) != (width, height) {
        filters.push(format!("scale={}:{}", target_width, target_height));
    }
    filters.push("setsar=1".to_string());
    filters
}

/// Frame size the source is displayed at: narrower-than-aspect sources are
/// widened to `height × aspect`, rounded up to an even width.
pub fn original_size(geometry: &StreamGeometry) -> (u32, u32) {
    let mut width = geometry.width;
    let widened = geometry.height as f64 * geometry.aspect_ratio;
    if (width as f64) < widened {
        width = widened as u32;
        width += width % 2;
    }
    (width, geometry.height)
}

pub fn decode_request(
    config: &AppConfig,
    input: &Path,
    geometry: &StreamGeometry,
    crop: CropRect,
) -> DecodeRequest {
    DecodeRequest {
        input: input.to_path_buf(),
        original_size: original_size(geometry),
        target_size: (geometry.width, geometry.height),
        crop,
        aspect_ratio: geometry.aspect_ratio,
        scale: config.use_64bit_encoders && config.use_ffmpeg_scaling,
        pipe: config.decode_pipe_path(),
    }
}
