// H.264 level limits (ITU-T H.264 Table A-1)

use crate::profile::{AvcLevel, AvcProfile};
use crate::stream::StreamGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelLimits {
    /// Max macroblocks per second.
    pub max_mbps: u64,
    /// Max frame size in macroblocks.
    pub max_fs: u64,
    /// Max decoded picture buffer size in macroblocks.
    pub max_dpb_mbs: u64,
    /// Max video bitrate in kbit/s for Baseline/Main.
    pub max_br: u64,
}

const fn limits(max_mbps: u64, max_fs: u64, max_dpb_mbs: u64, max_br: u64) -> LevelLimits {
    LevelLimits {
        max_mbps,
        max_fs,
        max_dpb_mbs,
        max_br,
    }
}

static LEVEL_LIMITS: [LevelLimits; 16] = [
    limits(1_485, 99, 396, 64),
    limits(3_000, 396, 900, 192),
    limits(6_000, 396, 2_376, 384),
    limits(11_880, 396, 2_376, 768),
    limits(11_880, 396, 2_376, 2_000),
    limits(19_800, 792, 4_752, 4_000),
    limits(20_250, 1_620, 8_100, 4_000),
    limits(40_500, 1_620, 8_100, 10_000),
    limits(108_000, 3_600, 18_000, 14_000),
    limits(216_000, 5_120, 20_480, 20_000),
    limits(245_760, 8_192, 32_768, 20_000),
    limits(245_760, 8_192, 32_768, 50_000),
    limits(522_240, 8_704, 34_816, 50_000),
    limits(589_824, 22_080, 110_400, 135_000),
    limits(983_040, 36_864, 184_320, 240_000),
    limits(2_073_600, 36_864, 184_320, 240_000),
];

pub fn level_limits(level: AvcLevel) -> Option<&'static LevelLimits> {
    AvcLevel::RESTRICTED
        .iter()
        .position(|l| *l == level)
        .map(|i| &LEVEL_LIMITS[i])
}

/// Max bitrate for a level, with the High profile allowance (x1.25).
fn max_bitrate(limits: &LevelLimits, profile: AvcProfile) -> u64 {
    match profile {
        AvcProfile::High => limits.max_br * 5 / 4,
        _ => limits.max_br,
    }
}

/// Largest reference count the level's DPB holds at this resolution.
/// `None` for unrestricted levels or degenerate geometry.
pub fn max_ref_for_level(level: AvcLevel, width: u32, height: u32) -> Option<u32> {
    let limits = level_limits(level)?;
    let frame_mbs = (width as u64).div_ceil(16) * (height as u64).div_ceil(16);
    if frame_mbs == 0 {
        return None;
    }
    Some((limits.max_dpb_mbs / frame_mbs).min(16) as u32)
}

/// Whether a stream of this size, rate and bitrate fits within `level`.
pub fn fits_level(
    level: AvcLevel,
    profile: AvcProfile,
    geometry: &StreamGeometry,
    bitrate_kbps: Option<u32>,
) -> bool {
    let Some(limits) = level_limits(level) else {
        return true;
    };
    let frame_mbs = geometry.frame_macroblocks();
    if frame_mbs > limits.max_fs {
        return false;
    }
    let mbps = (frame_mbs as f64 * geometry.fps()).ceil() as u64;
    if mbps > limits.max_mbps {
        return false;
    }
    match bitrate_kbps {
        Some(kbps) => kbps as u64 <= max_bitrate(limits, profile),
        None => true,
    }
}

/// Lowest level the stream fits in; `Unrestricted` when nothing fits.
pub fn min_level_for(
    profile: AvcProfile,
    geometry: &StreamGeometry,
    bitrate_kbps: Option<u32>,
) -> AvcLevel {
    AvcLevel::RESTRICTED
        .into_iter()
        .find(|level| fits_level(*level, profile, geometry, bitrate_kbps))
        .unwrap_or(AvcLevel::Unrestricted)
}

/// Raise `requested` to the lowest sufficient level; never lowers it.
pub fn raise_level(
    requested: AvcLevel,
    profile: AvcProfile,
    geometry: &StreamGeometry,
    bitrate_kbps: Option<u32>,
) -> AvcLevel {
    if !requested.is_restricted() {
        return requested;
    }
    let needed = min_level_for(profile, geometry, bitrate_kbps);
    requested.max(needed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(width: u32, height: u32, fps_num: u32, fps_den: u32) -> StreamGeometry {
        StreamGeometry {
            width,
            height,
            fps_num,
            fps_den,
            ..Default::default()
        }
    }

    #[test]
    fn test_max_ref_for_level_41_1080p() {
        // 32768 / 8160 = 4
        assert_eq!(max_ref_for_level(AvcLevel::L4_1, 1920, 1080), Some(4));
    }

    #[test]
    fn test_max_ref_capped_at_16() {
        assert_eq!(max_ref_for_level(AvcLevel::L5_1, 320, 240), Some(16));
    }

    #[test]
    fn test_max_ref_unrestricted() {
        assert_eq!(max_ref_for_level(AvcLevel::Unrestricted, 1920, 1080), None);
    }

    #[test]
    fn test_min_level_1080p25() {
        let g = geometry(1920, 1080, 25, 1);
        assert_eq!(min_level_for(AvcProfile::High, &g, None), AvcLevel::L4);
    }

    #[test]
    fn test_min_level_considers_bitrate() {
        let g = geometry(1920, 1080, 25, 1);
        // 30000 kbps exceeds level 4 High (25000) but fits 4.1
        assert_eq!(
            min_level_for(AvcProfile::High, &g, Some(30_000)),
            AvcLevel::L4_1
        );
    }

    #[test]
    fn test_raise_never_lowers() {
        let g = geometry(640, 480, 25, 1);
        assert_eq!(
            raise_level(AvcLevel::L5_1, AvcProfile::High, &g, None),
            AvcLevel::L5_1
        );
    }

    #[test]
    fn test_raise_to_sufficient_level() {
        let g = geometry(1920, 1080, 25, 1);
        assert_eq!(
            raise_level(AvcLevel::L3, AvcProfile::Main, &g, None),
            AvcLevel::L4
        );
    }

    #[test]
    fn test_unrestricted_stays_unrestricted() {
        let g = geometry(4096, 2304, 60, 1);
        assert_eq!(
            raise_level(AvcLevel::Unrestricted, AvcProfile::High, &g, None),
            AvcLevel::Unrestricted
        );
    }
}
