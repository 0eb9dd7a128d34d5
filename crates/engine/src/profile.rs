//! Per-job x264 encoding profile. Fields default to what x264 picks for
//! the `medium` preset.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::device::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvcProfile {
    Baseline,
    Main,
    #[default]
    High,
}

impl AvcProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            AvcProfile::Baseline => "baseline",
            AvcProfile::Main => "main",
            AvcProfile::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum AvcLevel {
    #[serde(rename = "1")]
    L1,
    #[serde(rename = "1.1")]
    L1_1,
    #[serde(rename = "1.2")]
    L1_2,
    #[serde(rename = "1.3")]
    L1_3,
    #[serde(rename = "2")]
    L2,
    #[serde(rename = "2.1")]
    L2_1,
    #[serde(rename = "2.2")]
    L2_2,
    #[serde(rename = "3")]
    L3,
    #[serde(rename = "3.1")]
    L3_1,
    #[serde(rename = "3.2")]
    L3_2,
    #[serde(rename = "4")]
    L4,
    #[serde(rename = "4.1")]
    L4_1,
    #[serde(rename = "4.2")]
    L4_2,
    #[serde(rename = "5")]
    L5,
    #[serde(rename = "5.1")]
    L5_1,
    #[serde(rename = "5.2")]
    L5_2,
    #[default]
    #[serde(rename = "unrestricted")]
    Unrestricted,
}

impl AvcLevel {
    /// All restricted levels, lowest first.
    pub const RESTRICTED: [AvcLevel; 16] = [
        AvcLevel::L1,
        AvcLevel::L1_1,
        AvcLevel::L1_2,
        AvcLevel::L1_3,
        AvcLevel::L2,
        AvcLevel::L2_1,
        AvcLevel::L2_2,
        AvcLevel::L3,
        AvcLevel::L3_1,
        AvcLevel::L3_2,
        AvcLevel::L4,
        AvcLevel::L4_1,
        AvcLevel::L4_2,
        AvcLevel::L5,
        AvcLevel::L5_1,
        AvcLevel::L5_2,
    ];

    /// Spelling understood by the x264 CLI (`4.1`).
    pub fn dotted(self) -> &'static str {
        match self {
            AvcLevel::L1 => "1",
            AvcLevel::L1_1 => "1.1",
            AvcLevel::L1_2 => "1.2",
            AvcLevel::L1_3 => "1.3",
            AvcLevel::L2 => "2",
            AvcLevel::L2_1 => "2.1",
            AvcLevel::L2_2 => "2.2",
            AvcLevel::L3 => "3",
            AvcLevel::L3_1 => "3.1",
            AvcLevel::L3_2 => "3.2",
            AvcLevel::L4 => "4",
            AvcLevel::L4_1 => "4.1",
            AvcLevel::L4_2 => "4.2",
            AvcLevel::L5 => "5",
            AvcLevel::L5_1 => "5.1",
            AvcLevel::L5_2 => "5.2",
            AvcLevel::Unrestricted => "unrestricted",
        }
    }

    /// Spelling understood by ffmpeg's libx264 wrapper (`41`).
    pub fn compact(self) -> String {
        self.dotted().replace('.', "")
    }

    pub fn is_restricted(self) -> bool {
        self != AvcLevel::Unrestricted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateControl {
    Abr,
    ConstantQuantizer,
    TwoPass,
    ThreePass,
    #[default]
    Crf,
}

impl RateControl {
    pub fn required_passes(self) -> u8 {
        match self {
            RateControl::TwoPass => 2,
            RateControl::ThreePass => 3,
            _ => 1,
        }
    }

    pub fn is_multipass(self) -> bool {
        self.required_passes() > 1
    }

    /// Modes whose output size is driven by a bitrate target.
    pub fn is_bitrate_driven(self) -> bool {
        matches!(
            self,
            RateControl::Abr | RateControl::TwoPass | RateControl::ThreePass
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Preset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    #[default]
    Medium,
    Slow,
    Slower,
    Veryslow,
    Placebo,
}

impl Preset {
    pub const ALL: [Preset; 10] = [
        Preset::Ultrafast,
        Preset::Superfast,
        Preset::Veryfast,
        Preset::Faster,
        Preset::Fast,
        Preset::Medium,
        Preset::Slow,
        Preset::Slower,
        Preset::Veryslow,
        Preset::Placebo,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Ultrafast => "ultrafast",
            Preset::Superfast => "superfast",
            Preset::Veryfast => "veryfast",
            Preset::Faster => "faster",
            Preset::Fast => "fast",
            Preset::Medium => "medium",
            Preset::Slow => "slow",
            Preset::Slower => "slower",
            Preset::Veryslow => "veryslow",
            Preset::Placebo => "placebo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tuning {
    #[default]
    None,
    Film,
    Animation,
    Grain,
    Psnr,
    Ssim,
    FastDecode,
    Touhou,
}

impl Tuning {
    pub const ALL: [Tuning; 8] = [
        Tuning::None,
        Tuning::Film,
        Tuning::Animation,
        Tuning::Grain,
        Tuning::Psnr,
        Tuning::Ssim,
        Tuning::FastDecode,
        Tuning::Touhou,
    ];

    /// Name passed to `--tune`; `None` emits nothing.
    pub fn as_str(self) -> Option<&'static str> {
        match self {
            Tuning::None => None,
            Tuning::Film => Some("film"),
            Tuning::Animation => Some("animation"),
            Tuning::Grain => Some("grain"),
            Tuning::Psnr => Some("psnr"),
            Tuning::Ssim => Some("ssim"),
            Tuning::FastDecode => Some("fastdecode"),
            Tuning::Touhou => Some("touhou"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GopCalculation {
    #[default]
    Fixed,
    RelativeTo25Fps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BPyramid {
    None,
    Strict,
    #[default]
    Normal,
}

impl BPyramid {
    pub fn as_str(self) -> &'static str {
        match self {
            BPyramid::None => "none",
            BPyramid::Strict => "strict",
            BPyramid::Normal => "normal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionEstimation {
    Dia,
    #[default]
    Hex,
    Umh,
    Esa,
    Tesa,
}

impl MotionEstimation {
    pub fn as_str(self) -> &'static str {
        match self {
            MotionEstimation::Dia => "dia",
            MotionEstimation::Hex => "hex",
            MotionEstimation::Umh => "umh",
            MotionEstimation::Esa => "esa",
            MotionEstimation::Tesa => "tesa",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectPrediction {
    None,
    #[default]
    Spatial,
    Temporal,
    Auto,
}

impl DirectPrediction {
    pub fn as_str(self) -> &'static str {
        match self {
            DirectPrediction::None => "none",
            DirectPrediction::Spatial => "spatial",
            DirectPrediction::Temporal => "temporal",
            DirectPrediction::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantMatrix {
    #[default]
    Flat,
    Jvt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VuiRange {
    #[default]
    Auto,
    Tv,
    Pc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NalHrd {
    #[default]
    None,
    Vbr,
    Cbr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalSar {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    R4x3,
    #[serde(rename = "8:9")]
    R8x9,
    #[serde(rename = "10:11")]
    R10x11,
    #[serde(rename = "12:11")]
    R12x11,
    #[serde(rename = "16:11")]
    R16x11,
    #[serde(rename = "32:27")]
    R32x27,
    #[serde(rename = "40:33")]
    R40x33,
    #[serde(rename = "64:45")]
    R64x45,
}

impl CanonicalSar {
    pub const ALL: [CanonicalSar; 9] = [
        CanonicalSar::Square,
        CanonicalSar::R4x3,
        CanonicalSar::R8x9,
        CanonicalSar::R10x11,
        CanonicalSar::R12x11,
        CanonicalSar::R16x11,
        CanonicalSar::R32x27,
        CanonicalSar::R40x33,
        CanonicalSar::R64x45,
    ];

    pub fn ratio(self) -> (u32, u32) {
        match self {
            CanonicalSar::Square => (1, 1),
            CanonicalSar::R4x3 => (4, 3),
            CanonicalSar::R8x9 => (8, 9),
            CanonicalSar::R10x11 => (10, 11),
            CanonicalSar::R12x11 => (12, 11),
            CanonicalSar::R16x11 => (16, 11),
            CanonicalSar::R32x27 => (32, 27),
            CanonicalSar::R40x33 => (40, 33),
            CanonicalSar::R64x45 => (64, 45),
        }
    }

    pub fn from_ratio(x: u32, y: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|sar| sar.ratio() == (x, y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorPrimaries {
    #[default]
    Unset,
    Bt709,
    Bt470m,
    Bt470bg,
    Smpte170m,
    Smpte240m,
    Film,
}

impl ColorPrimaries {
    pub fn as_str(self) -> Option<&'static str> {
        match self {
            ColorPrimaries::Unset => None,
            ColorPrimaries::Bt709 => Some("bt709"),
            ColorPrimaries::Bt470m => Some("bt470m"),
            ColorPrimaries::Bt470bg => Some("bt470bg"),
            ColorPrimaries::Smpte170m => Some("smpte170m"),
            ColorPrimaries::Smpte240m => Some("smpte240m"),
            ColorPrimaries::Film => Some("film"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferCharacteristics {
    #[default]
    Unset,
    Bt709,
    Bt470m,
    Bt470bg,
    Linear,
    Log100,
    Log316,
    Smpte170m,
    Smpte240m,
}

impl TransferCharacteristics {
    pub fn as_str(self) -> Option<&'static str> {
        match self {
            TransferCharacteristics::Unset => None,
            TransferCharacteristics::Bt709 => Some("bt709"),
            TransferCharacteristics::Bt470m => Some("bt470m"),
            TransferCharacteristics::Bt470bg => Some("bt470bg"),
            TransferCharacteristics::Linear => Some("linear"),
            TransferCharacteristics::Log100 => Some("log100"),
            TransferCharacteristics::Log316 => Some("log316"),
            TransferCharacteristics::Smpte170m => Some("smpte170m"),
            TransferCharacteristics::Smpte240m => Some("smpte240m"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorMatrix {
    #[default]
    #[serde(rename = "unset")]
    Unset,
    #[serde(rename = "bt709")]
    Bt709,
    #[serde(rename = "fcc")]
    Fcc,
    #[serde(rename = "bt470bg")]
    Bt470bg,
    #[serde(rename = "smpte170m")]
    Smpte170m,
    #[serde(rename = "smpte240m")]
    Smpte240m,
    #[serde(rename = "GBR")]
    Gbr,
    #[serde(rename = "YCgCo")]
    YCgCo,
}

impl ColorMatrix {
    pub fn as_str(self) -> Option<&'static str> {
        match self {
            ColorMatrix::Unset => None,
            ColorMatrix::Bt709 => Some("bt709"),
            ColorMatrix::Fcc => Some("fcc"),
            ColorMatrix::Bt470bg => Some("bt470bg"),
            ColorMatrix::Smpte170m => Some("smpte170m"),
            ColorMatrix::Smpte240m => Some("smpte240m"),
            ColorMatrix::Gbr => Some("GBR"),
            ColorMatrix::YCgCo => Some("YCgCo"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterlaceMode {
    #[default]
    Unset,
    Progressive,
    Bff,
    Tff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Pulldown {
    #[default]
    #[serde(rename = "unset")]
    Unset,
    #[serde(rename = "none")]
    None,
    #[serde(rename = "22")]
    P22,
    #[serde(rename = "32")]
    P32,
    #[serde(rename = "64")]
    P64,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "triple")]
    Triple,
    #[serde(rename = "euro")]
    Euro,
}

impl Pulldown {
    /// Value passed to `--pulldown`; unset and none emit nothing.
    pub fn as_str(self) -> Option<&'static str> {
        match self {
            Pulldown::Unset | Pulldown::None => None,
            Pulldown::P22 => Some("22"),
            Pulldown::P32 => Some("32"),
            Pulldown::P64 => Some("64"),
            Pulldown::Double => Some("double"),
            Pulldown::Triple => Some("triple"),
            Pulldown::Euro => Some("euro"),
        }
    }

    pub fn is_active(self) -> bool {
        self.as_str().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Partitions {
    pub p8x8: bool,
    pub b8x8: bool,
    pub i4x4: bool,
    pub p4x4: bool,
    pub i8x8: bool,
}

impl Partitions {
    pub const ALL: Partitions = Partitions {
        p8x8: true,
        b8x8: true,
        i4x4: true,
        p4x4: true,
        i8x8: true,
    };

    pub const NONE: Partitions = Partitions {
        p8x8: false,
        b8x8: false,
        i4x4: false,
        p4x4: false,
        i8x8: false,
    };

    /// Argument for `--partitions`, in x264's fixed order.
    pub fn describe(&self) -> String {
        if *self == Self::ALL {
            return "all".to_string();
        }
        if *self == Self::NONE {
            return "none".to_string();
        }
        [
            (self.p8x8, "p8x8"),
            (self.b8x8, "b8x8"),
            (self.i4x4, "i4x4"),
            (self.p4x4, "p4x4"),
            (self.i8x8, "i8x8"),
        ]
        .iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(",")
    }
}

impl Default for Partitions {
    fn default() -> Self {
        Self {
            p4x4: false,
            ..Self::ALL
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingProfile {
    pub name: String,
    pub device: DeviceId,

    // Codec profile and level
    pub avc_profile: AvcProfile,
    pub avc_level: AvcLevel,
    pub bluray_compat: bool,
    pub preset: Preset,
    pub tuning: Tuning,

    // Rate control
    pub rate_control: RateControl,
    pub vbr_bitrate: u32,
    pub quantizer: u32,
    pub crf: u32,
    pub slow_first_pass: bool,

    // Threading
    pub thread_input: bool,
    pub threads: u32,

    // Frame types
    pub deblocking: bool,
    pub deblock_strength: i32,
    pub deblock_threshold: i32,
    pub cabac: bool,
    pub max_gop: u32,
    pub min_gop: u32,
    pub gop_calculation: GopCalculation,
    pub open_gop: bool,
    pub bframes: u32,
    pub b_adapt: u32,
    pub b_pyramid: BPyramid,
    pub weighted_b: bool,
    pub b_bias: i32,
    pub adaptive_scenecut: bool,
    pub scenecut: u32,
    pub ref_frames: u32,
    pub weightp: u32,
    pub slices: u32,
    pub slice_max_size: u32,
    pub slice_max_mbs: u32,

    // Rate-control tuning
    pub qp_min: u32,
    pub qp_max: u32,
    pub qp_step: u32,
    pub ip_ratio: f32,
    pub pb_ratio: f32,
    pub chroma_qp_offset: i32,
    pub vbv_bufsize: u32,
    pub vbv_maxrate: u32,
    pub vbv_init: f32,
    pub ratetol: f32,
    pub qcomp: f32,
    pub cplxblur: u32,
    pub qblur: f32,
    pub deadzone_inter: u32,
    pub deadzone_intra: u32,
    pub mbtree: bool,
    pub rc_lookahead: u32,
    pub aq_mode: u32,
    pub aq_strength: f32,
    pub quant_matrix: QuantMatrix,

    // Analysis
    pub chroma_me: bool,
    pub merange: u32,
    pub me: MotionEstimation,
    pub direct: DirectPrediction,
    pub noise_reduction: u32,
    pub subme: u32,
    pub partitions: Partitions,
    pub dct8x8: bool,
    pub trellis: u32,
    pub psy_rd: f32,
    pub psy_trellis: f32,
    pub mixed_refs: bool,
    pub dct_decimate: bool,
    pub fast_pskip: bool,
    pub psy: bool,
    pub aud: bool,
    pub nal_hrd: NalHrd,
    pub non_deterministic: bool,

    // Misc
    pub psnr: bool,
    pub ssim: bool,
    pub range: VuiRange,

    // Output metadata
    pub auto_sar: bool,
    pub forced_sar: Option<CanonicalSar>,
    pub auto_color: bool,
    pub color_primaries: ColorPrimaries,
    pub transfer: TransferCharacteristics,
    pub color_matrix: ColorMatrix,
    pub interlace: InterlaceMode,
    pub pulldown: Pulldown,
    pub fake_interlaced: bool,
    pub force_pic_struct: bool,

    /// Free-form encoder options appended verbatim; any option it names is
    /// never emitted by the synthesizer.
    pub custom_command_line: String,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            device: DeviceId::Default,
            avc_profile: AvcProfile::High,
            avc_level: AvcLevel::Unrestricted,
            bluray_compat: false,
            preset: Preset::Medium,
            tuning: Tuning::None,
            rate_control: RateControl::Crf,
            vbr_bitrate: 2500,
            quantizer: 23,
            crf: 23,
            slow_first_pass: false,
            thread_input: true,
            threads: 0,
            deblocking: true,
            deblock_strength: 0,
            deblock_threshold: 0,
            cabac: true,
            max_gop: 250,
            min_gop: 25,
            gop_calculation: GopCalculation::Fixed,
            open_gop: false,
            bframes: 3,
            b_adapt: 1,
            b_pyramid: BPyramid::Normal,
            weighted_b: true,
            b_bias: 0,
            adaptive_scenecut: true,
            scenecut: 40,
            ref_frames: 3,
            weightp: 2,
            slices: 0,
            slice_max_size: 0,
            slice_max_mbs: 0,
            qp_min: 0,
            qp_max: 69,
            qp_step: 4,
            ip_ratio: 1.4,
            pb_ratio: 1.3,
            chroma_qp_offset: 0,
            vbv_bufsize: 0,
            vbv_maxrate: 0,
            vbv_init: 0.9,
            ratetol: 1.0,
            qcomp: 0.6,
            cplxblur: 20,
            qblur: 0.5,
            deadzone_inter: 21,
            deadzone_intra: 11,
            mbtree: true,
            rc_lookahead: 40,
            aq_mode: 1,
            aq_strength: 1.0,
            quant_matrix: QuantMatrix::Flat,
            chroma_me: true,
            merange: 16,
            me: MotionEstimation::Hex,
            direct: DirectPrediction::Spatial,
            noise_reduction: 0,
            subme: 7,
            partitions: Partitions::default(),
            dct8x8: true,
            trellis: 1,
            psy_rd: 1.0,
            psy_trellis: 0.0,
            mixed_refs: true,
            dct_decimate: true,
            fast_pskip: true,
            psy: true,
            aud: false,
            nal_hrd: NalHrd::None,
            non_deterministic: false,
            psnr: false,
            ssim: false,
            range: VuiRange::Auto,
            auto_sar: true,
            forced_sar: None,
            auto_color: true,
            color_primaries: ColorPrimaries::Unset,
            transfer: TransferCharacteristics::Unset,
            color_matrix: ColorMatrix::Unset,
            interlace: InterlaceMode::Unset,
            pulldown: Pulldown::Unset,
            fake_interlaced: false,
            force_pic_struct: false,
            custom_command_line: String::new(),
        }
    }
}

/// Load an encoding profile from a TOML file.
pub fn load_profile(path: &Path) -> Result<EncodingProfile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile file {:?}", path))?;
    toml::from_str::<EncodingProfile>(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse TOML profile {:?}: {}", path, e))
}
