pub mod defaults;
pub mod level;
pub mod sar;

use serde::Serialize;

use crate::device::DeviceCapability;
use crate::profile::{
    AvcLevel, BPyramid, ColorMatrix, ColorPrimaries, EncodingProfile, GopCalculation,
    InterlaceMode, NalHrd, Pulldown, TransferCharacteristics,
};
use crate::stream::{StreamGeometry, VideoFormat};

pub use sar::SampleAspect;

/// Resolved values for one encoder invocation. Fields here take precedence
/// over the corresponding profile fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveSettings {
    #[serde(skip)]
    pub profile: EncodingProfile,
    #[serde(skip)]
    pub device: DeviceCapability,
    pub geometry: StreamGeometry,
    pub pass: u8,
    pub level: AvcLevel,
    pub bitrate: u32,
    /// Max GOP length; 0 means infinite.
    pub keyint: u32,
    pub min_keyint: u32,
    pub bframes: u32,
    pub b_pyramid: BPyramid,
    pub ref_frames: u32,
    pub weightp: u32,
    pub slices: u32,
    pub vbv_bufsize: u32,
    pub vbv_maxrate: u32,
    pub aud: bool,
    pub nal_hrd: NalHrd,
    pub sar: Option<SampleAspect>,
    pub color_primaries: ColorPrimaries,
    pub transfer: TransferCharacteristics,
    pub color_matrix: ColorMatrix,
    pub interlace: InterlaceMode,
    pub pulldown: Pulldown,
    pub fake_interlaced: bool,
    pub force_pic_struct: bool,
}

impl EffectiveSettings {
    pub fn is_final_pass(&self) -> bool {
        self.pass >= self.profile.rate_control.required_passes()
    }

    /// First pass of a multi-pass job writes its stream to the null sink.
    pub fn writes_null_output(&self) -> bool {
        self.profile.rate_control.is_multipass() && self.pass == 1
    }
}

/// Resolve the settings for one pass. `target_bitrate` of 0 means "use the
/// profile's nominal bitrate". The profile is copied, never modified.
pub fn resolve(
    profile: &EncodingProfile,
    device: &DeviceCapability,
    geometry: &StreamGeometry,
    target_bitrate: u32,
    pass: u8,
) -> EffectiveSettings {
    let vbv_bufsize = clamp_vbv(profile.vbv_bufsize, device.vbv_bufsize);
    let vbv_maxrate = clamp_vbv(profile.vbv_maxrate, device.vbv_maxrate);
    let bitrate = effective_bitrate(target_bitrate, profile.vbr_bitrate, vbv_maxrate);

    let level = level::raise_level(
        profile.avc_level,
        profile.avc_profile,
        geometry,
        profile
            .rate_control
            .is_bitrate_driven()
            .then_some(bitrate),
    );

    let keyint = keyint(profile.max_gop, profile.gop_calculation, geometry, device);
    let min_keyint = min_keyint(profile.min_gop, keyint, profile.gop_calculation, geometry, device);

    let bframes = match device.max_bframes {
        Some(max) => profile.bframes.min(max),
        None => profile.bframes,
    };

    let metadata = FormatMetadata::derive(profile, device, geometry);

    EffectiveSettings {
        profile: profile.clone(),
        device: *device,
        geometry: geometry.clone(),
        pass,
        level,
        bitrate,
        keyint,
        min_keyint,
        bframes,
        b_pyramid: b_pyramid(profile.b_pyramid, device, profile.bluray_compat),
        ref_frames: ref_frames(profile.ref_frames, level, geometry, device),
        weightp: if device.bluray {
            profile.weightp.min(1)
        } else {
            profile.weightp
        },
        slices: if device.bluray { 4 } else { profile.slices },
        vbv_bufsize,
        vbv_maxrate,
        aud: profile.aud || device.bluray,
        nal_hrd: if device.bluray {
            profile.nal_hrd.max(NalHrd::Vbr)
        } else {
            profile.nal_hrd
        },
        sar: sample_aspect(profile, geometry),
        color_primaries: metadata.color_primaries,
        transfer: metadata.transfer,
        color_matrix: metadata.color_matrix,
        interlace: metadata.interlace,
        pulldown: metadata.pulldown,
        fake_interlaced: metadata.fake_interlaced,
        force_pic_struct: metadata.force_pic_struct,
    }
}

/// Device ceiling applies when the profile exceeds it or leaves it unset.
fn clamp_vbv(value: u32, ceiling: Option<u32>) -> u32 {
    match ceiling {
        Some(max) if value == 0 || value > max => max,
        _ => value,
    }
}

fn effective_bitrate(target: u32, nominal: u32, vbv_maxrate: u32) -> u32 {
    let bitrate = if target > 0 { target } else { nominal };
    if vbv_maxrate > 0 {
        bitrate.min(vbv_maxrate)
    } else {
        bitrate
    }
}

/// Max GOP length in frames; 0 stays infinite unless the device caps it.
pub fn keyint(
    max_gop: u32,
    calculation: GopCalculation,
    geometry: &StreamGeometry,
    device: &DeviceCapability,
) -> u32 {
    let fps = geometry.fps();
    let keyint = match calculation {
        GopCalculation::Fixed => max_gop,
        GopCalculation::RelativeTo25Fps => (max_gop as f64 / 25.0 * fps).round() as u32,
    };

    match device.max_gop_seconds {
        Some(seconds) => {
            let ceiling = fps.round() as u32 * seconds;
            if ceiling > 0 && (keyint == 0 || keyint > ceiling) {
                ceiling
            } else {
                keyint
            }
        }
        None => keyint,
    }
}

/// Min GOP length, never above `keyint / 2 + 1`.
pub fn min_keyint(
    min_gop: u32,
    keyint: u32,
    calculation: GopCalculation,
    geometry: &StreamGeometry,
    device: &DeviceCapability,
) -> u32 {
    if keyint == 0 {
        return defaults::min_keyint(keyint, geometry.fps_num, geometry.fps_den);
    }

    let mut min = match calculation {
        GopCalculation::Fixed => min_gop,
        GopCalculation::RelativeTo25Fps => (min_gop as f64 / 25.0 * geometry.fps()) as u32,
    };

    let ceiling = keyint / 2 + 1;
    if device.max_gop_seconds.is_some() && min > ceiling {
        min = keyint / 10;
    }
    min.min(ceiling)
}

/// Blu-ray streams only allow a strict pyramid or none.
fn b_pyramid(requested: BPyramid, device: &DeviceCapability, bluray_compat: bool) -> BPyramid {
    let pyramid = device.b_pyramid.unwrap_or(requested);
    if (device.bluray || bluray_compat) && pyramid > BPyramid::Strict {
        BPyramid::Strict
    } else {
        pyramid
    }
}

fn ref_frames(
    requested: u32,
    level: AvcLevel,
    geometry: &StreamGeometry,
    device: &DeviceCapability,
) -> u32 {
    let mut refs = requested;
    if let Some(max) = device.max_ref_frames {
        refs = refs.min(max);
    }
    if let Some(max) = level::max_ref_for_level(level, geometry.width, geometry.height) {
        refs = refs.min(max);
    }
    refs
}

fn sample_aspect(profile: &EncodingProfile, geometry: &StreamGeometry) -> Option<SampleAspect> {
    if profile.auto_sar {
        Some(sar::sample_aspect(
            geometry.display_aspect(),
            geometry.width,
            geometry.height,
        ))
    } else {
        profile.forced_sar.map(SampleAspect::Canonical)
    }
}

/// Colour, interlace and pulldown values implied by the source format.
struct FormatMetadata {
    color_primaries: ColorPrimaries,
    transfer: TransferCharacteristics,
    color_matrix: ColorMatrix,
    interlace: InterlaceMode,
    pulldown: Pulldown,
    fake_interlaced: bool,
    force_pic_struct: bool,
}

impl FormatMetadata {
    fn derive(
        profile: &EncodingProfile,
        device: &DeviceCapability,
        geometry: &StreamGeometry,
    ) -> Self {
        let format = geometry.format;
        let (primaries, transfer, matrix) = format_colors(format);
        let format_interlace = if format.is_interlaced() {
            InterlaceMode::Bff
        } else {
            InterlaceMode::Progressive
        };
        let format_pulldown = match format {
            VideoFormat::F480p => Pulldown::P32,
            VideoFormat::F720p if geometry.is_broadcast_rate() => Pulldown::Double,
            _ => profile.pulldown,
        };

        let color = |unset: bool| device.bluray || (profile.auto_color && unset);

        let mut metadata = Self {
            color_primaries: profile.color_primaries,
            transfer: profile.transfer,
            color_matrix: profile.color_matrix,
            interlace: profile.interlace,
            pulldown: profile.pulldown,
            fake_interlaced: profile.fake_interlaced,
            force_pic_struct: profile.force_pic_struct,
        };

        if let Some(primaries) = primaries {
            if color(profile.color_primaries == ColorPrimaries::Unset) {
                metadata.color_primaries = primaries;
            }
        }
        if let Some(transfer) = transfer {
            if color(profile.transfer == TransferCharacteristics::Unset) {
                metadata.transfer = transfer;
            }
        }
        if let Some(matrix) = matrix {
            if color(profile.color_matrix == ColorMatrix::Unset) {
                metadata.color_matrix = matrix;
            }
        }

        if device.bluray {
            if profile.interlace < InterlaceMode::Bff {
                metadata.interlace = format_interlace;
            }
            metadata.fake_interlaced = match format {
                VideoFormat::F480p | VideoFormat::F576p => true,
                VideoFormat::F1080p if geometry.is_broadcast_rate() => true,
                _ => profile.fake_interlaced,
            };
            metadata.force_pic_struct = format == VideoFormat::F576p || profile.force_pic_struct;
            metadata.pulldown = format_pulldown;
        } else {
            if profile.interlace == InterlaceMode::Unset {
                metadata.interlace = format_interlace;
            }
            if profile.pulldown == Pulldown::Unset {
                metadata.pulldown = format_pulldown;
            }
        }

        metadata
    }
}

fn format_colors(
    format: VideoFormat,
) -> (
    Option<ColorPrimaries>,
    Option<TransferCharacteristics>,
    Option<ColorMatrix>,
) {
    match format {
        VideoFormat::F480i | VideoFormat::F480p => (
            Some(ColorPrimaries::Smpte170m),
            Some(TransferCharacteristics::Smpte170m),
            Some(ColorMatrix::Smpte170m),
        ),
        VideoFormat::F576i | VideoFormat::F576p => (
            Some(ColorPrimaries::Bt470bg),
            Some(TransferCharacteristics::Bt470bg),
            Some(ColorMatrix::Bt470bg),
        ),
        VideoFormat::F720p | VideoFormat::F1080i | VideoFormat::F1080p => (
            Some(ColorPrimaries::Bt709),
            Some(TransferCharacteristics::Bt709),
            Some(ColorMatrix::Bt709),
        ),
        VideoFormat::Unknown => (None, None, None),
    }
}
