use serde::{Deserialize, Serialize};

/// Broadcast format of the source, used to derive colour and interlace metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoFormat {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "480i")]
    F480i,
    #[serde(rename = "480p")]
    F480p,
    #[serde(rename = "576i")]
    F576i,
    #[serde(rename = "576p")]
    F576p,
    #[serde(rename = "720p")]
    F720p,
    #[serde(rename = "1080i")]
    F1080i,
    #[serde(rename = "1080p")]
    F1080p,
}

impl VideoFormat {
    pub fn is_interlaced(self) -> bool {
        matches!(
            self,
            VideoFormat::F480i | VideoFormat::F576i | VideoFormat::F1080i
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoMode {
    #[default]
    None,
    SideBySide,
    TopAndBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRect {
    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.top == 0 && self.right == 0 && self.bottom == 0
    }
}

/// Resolved geometry of the stream handed to the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamGeometry {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub format: VideoFormat,
    /// Display aspect ratio; zero or negative when unknown.
    pub aspect_ratio: f64,
    pub frame_count: u64,
    pub stereo: StereoMode,
}

impl Default for StreamGeometry {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps_num: 25,
            fps_den: 1,
            format: VideoFormat::Unknown,
            aspect_ratio: 0.0,
            frame_count: 0,
            stereo: StereoMode::None,
        }
    }
}

impl StreamGeometry {
    pub fn fps(&self) -> f64 {
        if self.fps_den == 0 {
            return 0.0;
        }
        self.fps_num as f64 / self.fps_den as f64
    }

    /// 29.97 (30000/1001) or 25 (25000/1000) exactly, as signalled by the source.
    pub fn is_broadcast_rate(&self) -> bool {
        (self.fps_num == 30000 && self.fps_den == 1001)
            || (self.fps_num == 25000 && self.fps_den == 1000)
    }

    /// Display aspect ratio, falling back to the storage ratio when unknown.
    pub fn display_aspect(&self) -> f64 {
        if self.aspect_ratio > 0.0 {
            self.aspect_ratio
        } else if self.height > 0 {
            self.width as f64 / self.height as f64
        } else {
            1.0
        }
    }

    /// Macroblocks per frame.
    pub fn frame_macroblocks(&self) -> u64 {
        (self.width as u64).div_ceil(16) * (self.height as u64).div_ceil(16)
    }
}
