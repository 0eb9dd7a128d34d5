// x264's contextual defaults

use crate::device::DeviceCapability;
use crate::profile::{
    AvcLevel, AvcProfile, DirectPrediction, MotionEstimation, Partitions, Preset, Tuning,
};

use super::level::max_ref_for_level;

pub const DEFAULT_CRF: u32 = 23;
pub const DEFAULT_KEYINT: u32 = 250;
pub const DEFAULT_QP_MIN: u32 = 0;
pub const DEFAULT_QP_MAX: u32 = 69;
pub const DEFAULT_QP_STEP: u32 = 4;
pub const DEFAULT_IP_RATIO: f32 = 1.4;
pub const DEFAULT_PB_RATIO: f32 = 1.3;
pub const GRAIN_RATIO: f32 = 1.1;
pub const DEFAULT_VBV_INIT: f32 = 0.9;
pub const DEFAULT_RATETOL: f32 = 1.0;
pub const DEFAULT_CPLXBLUR: u32 = 20;
pub const DEFAULT_QBLUR: f32 = 0.5;
pub const DEFAULT_SCENECUT: u32 = 40;

const SUBME: [u32; 10] = [0, 1, 2, 4, 6, 7, 8, 9, 10, 11];
const TRELLIS: [u32; 10] = [0, 0, 0, 1, 1, 1, 1, 2, 2, 2];
const RC_LOOKAHEAD: [u32; 10] = [0, 0, 10, 20, 30, 40, 50, 60, 60, 60];
const REF_FRAMES: [u32; 10] = [1, 1, 1, 2, 2, 3, 5, 8, 16, 16];
const ME: [MotionEstimation; 10] = [
    MotionEstimation::Dia,
    MotionEstimation::Dia,
    MotionEstimation::Hex,
    MotionEstimation::Hex,
    MotionEstimation::Hex,
    MotionEstimation::Hex,
    MotionEstimation::Umh,
    MotionEstimation::Umh,
    MotionEstimation::Umh,
    MotionEstimation::Tesa,
];

/// Float comparison used for every fractional option.
pub fn same(a: f32, b: f32) -> bool {
    (a - b).abs() <= f32::EPSILON
}

pub fn subme(preset: Preset) -> u32 {
    SUBME[preset.index()]
}

pub fn trellis(preset: Preset) -> u32 {
    TRELLIS[preset.index()]
}

pub fn motion_estimation(preset: Preset) -> MotionEstimation {
    ME[preset.index()]
}

pub fn merange(preset: Preset) -> u32 {
    if preset <= Preset::Slower {
        16
    } else {
        24
    }
}

pub fn rc_lookahead(preset: Preset) -> u32 {
    RC_LOOKAHEAD[preset.index()]
}

pub fn b_adapt(preset: Preset) -> u32 {
    if preset > Preset::Medium {
        2
    } else if preset > Preset::Ultrafast {
        1
    } else {
        0
    }
}

pub fn direct(preset: Preset) -> DirectPrediction {
    if preset > Preset::Medium {
        DirectPrediction::Auto
    } else {
        DirectPrediction::Spatial
    }
}

pub fn scenecut(preset: Preset) -> u32 {
    if preset == Preset::Ultrafast {
        0
    } else {
        DEFAULT_SCENECUT
    }
}

/// Deblocking (strength, threshold).
pub fn deblock(tuning: Tuning) -> (i32, i32) {
    match tuning {
        Tuning::Film => (-1, -1),
        Tuning::Animation => (1, 1),
        Tuning::Grain => (-2, -2),
        _ => (0, 0),
    }
}

/// Psy-RD (strength, trellis).
pub fn psy_rd(tuning: Tuning) -> (f32, f32) {
    match tuning {
        Tuning::Film => (1.0, 0.15),
        Tuning::Animation => (0.4, 0.0),
        Tuning::Grain => (1.0, 0.25),
        Tuning::Touhou => (1.0, 0.2),
        _ => (1.0, 0.0),
    }
}

pub fn aq_strength(tuning: Tuning) -> f32 {
    match tuning {
        Tuning::Animation => 0.6,
        Tuning::Grain => 0.5,
        Tuning::Touhou => 1.3,
        _ => 1.0,
    }
}

pub fn aq_mode(preset: Preset, tuning: Tuning) -> u32 {
    if tuning == Tuning::Ssim {
        2
    } else if preset == Preset::Ultrafast || tuning == Tuning::Psnr {
        0
    } else {
        1
    }
}

pub fn qcomp(tuning: Tuning) -> f32 {
    if tuning == Tuning::Grain {
        0.8
    } else {
        0.6
    }
}

/// Dead zones (inter, intra).
pub fn deadzones(tuning: Tuning) -> (u32, u32) {
    if tuning == Tuning::Grain {
        (6, 6)
    } else {
        (21, 11)
    }
}

pub fn bframes(preset: Preset, tuning: Tuning, profile: AvcProfile, device: &DeviceCapability) -> u32 {
    if profile == AvcProfile::Baseline {
        return 0;
    }
    let mut count = match preset {
        Preset::Ultrafast => 0,
        Preset::Veryslow => 8,
        Preset::Placebo => 16,
        _ => 3,
    };
    if tuning == Tuning::Animation && count > 0 {
        count += 2;
    }
    match device.max_bframes {
        Some(max) => count.min(max),
        None => count,
    }
}

pub fn ref_frames(preset: Preset, tuning: Tuning, level: AvcLevel, width: u32, height: u32) -> u32 {
    let mut count = REF_FRAMES[preset.index()];
    if matches!(tuning, Tuning::Animation | Tuning::Touhou) && count > 1 {
        count = (count * 2).min(16);
    }
    match max_ref_for_level(level, width, height) {
        Some(max) => count.min(max),
        None => count,
    }
}

pub fn weightp(preset: Preset, tuning: Tuning, profile: AvcProfile, bluray_compat: bool) -> u32 {
    let value = if profile == AvcProfile::Baseline
        || tuning == Tuning::FastDecode
        || preset == Preset::Ultrafast
    {
        0
    } else if preset <= Preset::Faster {
        1
    } else {
        2
    };
    if bluray_compat {
        value.min(1)
    } else {
        value
    }
}

/// Partition set x264 enables for this preset/tuning/profile.
pub fn partitions(preset: Preset, tuning: Tuning, profile: AvcProfile) -> Partitions {
    let mut expected = match preset {
        Preset::Ultrafast => Partitions::NONE,
        Preset::Superfast => Partitions {
            p8x8: false,
            b8x8: false,
            p4x4: false,
            ..Partitions::ALL
        },
        Preset::Veryfast | Preset::Faster | Preset::Fast | Preset::Medium | Preset::Slow => {
            Partitions {
                p4x4: false,
                ..Partitions::ALL
            }
        }
        Preset::Slower | Preset::Veryslow | Preset::Placebo => Partitions::ALL,
    };
    if tuning == Tuning::Touhou && expected.p8x8 {
        expected.p4x4 = true;
    }
    if profile < AvcProfile::High {
        expected.i8x8 = false;
    }
    expected
}

/// x264's implicit `--min-keyint`: `min(keyint / 10, fps)`.
pub fn min_keyint(keyint: u32, fps_num: u32, fps_den: u32) -> u32 {
    let fps = if fps_den == 0 { 0 } else { fps_num / fps_den };
    (keyint / 10).min(fps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;

    #[test]
    fn test_preset_tables() {
        assert_eq!(subme(Preset::Ultrafast), 0);
        assert_eq!(subme(Preset::Medium), 7);
        assert_eq!(subme(Preset::Placebo), 11);
        assert_eq!(trellis(Preset::Faster), 1);
        assert_eq!(trellis(Preset::Slower), 2);
        assert_eq!(motion_estimation(Preset::Superfast), MotionEstimation::Dia);
        assert_eq!(motion_estimation(Preset::Slow), MotionEstimation::Umh);
        assert_eq!(motion_estimation(Preset::Placebo), MotionEstimation::Tesa);
        assert_eq!(merange(Preset::Slower), 16);
        assert_eq!(merange(Preset::Veryslow), 24);
        assert_eq!(rc_lookahead(Preset::Medium), 40);
        assert_eq!(rc_lookahead(Preset::Placebo), 60);
    }

    #[test]
    fn test_b_adapt_and_direct_switch_after_medium() {
        assert_eq!(b_adapt(Preset::Ultrafast), 0);
        assert_eq!(b_adapt(Preset::Medium), 1);
        assert_eq!(b_adapt(Preset::Slow), 2);
        assert_eq!(direct(Preset::Medium), DirectPrediction::Spatial);
        assert_eq!(direct(Preset::Slow), DirectPrediction::Auto);
    }

    #[test]
    fn test_tuning_tables() {
        assert_eq!(deblock(Tuning::Film), (-1, -1));
        assert_eq!(deblock(Tuning::Grain), (-2, -2));
        assert_eq!(deblock(Tuning::Psnr), (0, 0));
        assert_eq!(psy_rd(Tuning::Animation), (0.4, 0.0));
        assert_eq!(psy_rd(Tuning::Touhou), (1.0, 0.2));
        assert!(same(aq_strength(Tuning::Touhou), 1.3));
        assert_eq!(deadzones(Tuning::Grain), (6, 6));
        assert_eq!(deadzones(Tuning::Film), (21, 11));
    }

    #[test]
    fn test_aq_mode_defaults() {
        assert_eq!(aq_mode(Preset::Medium, Tuning::Ssim), 2);
        assert_eq!(aq_mode(Preset::Ultrafast, Tuning::None), 0);
        assert_eq!(aq_mode(Preset::Medium, Tuning::Psnr), 0);
        assert_eq!(aq_mode(Preset::Medium, Tuning::Film), 1);
    }

    #[test]
    fn test_partition_expectations() {
        assert_eq!(
            partitions(Preset::Ultrafast, Tuning::None, AvcProfile::High),
            Partitions::NONE
        );
        assert_eq!(
            partitions(Preset::Medium, Tuning::None, AvcProfile::High),
            Partitions::default()
        );
        assert_eq!(
            partitions(Preset::Placebo, Tuning::None, AvcProfile::High),
            Partitions::ALL
        );
        assert!(partitions(Preset::Medium, Tuning::Touhou, AvcProfile::High).p4x4);
        assert!(!partitions(Preset::Superfast, Tuning::Touhou, AvcProfile::High).p4x4);
        assert!(!partitions(Preset::Medium, Tuning::None, AvcProfile::Main).i8x8);
    }

    #[test]
    fn test_bframes_respects_profile_and_device() {
        let open = DeviceId::Default.capability();
        assert_eq!(bframes(Preset::Medium, Tuning::None, AvcProfile::High, open), 3);
        assert_eq!(bframes(Preset::Medium, Tuning::Animation, AvcProfile::High, open), 5);
        assert_eq!(bframes(Preset::Medium, Tuning::None, AvcProfile::Baseline, open), 0);
        assert_eq!(bframes(Preset::Placebo, Tuning::None, AvcProfile::High, open), 16);

        let bluray = DeviceId::BluRay.capability();
        assert_eq!(bframes(Preset::Placebo, Tuning::None, AvcProfile::High, bluray), 3);
    }

    #[test]
    fn test_ref_frames_doubling_and_level_cap() {
        assert_eq!(
            ref_frames(Preset::Medium, Tuning::None, AvcLevel::Unrestricted, 1920, 1080),
            3
        );
        assert_eq!(
            ref_frames(Preset::Medium, Tuning::Animation, AvcLevel::Unrestricted, 1920, 1080),
            6
        );
        assert_eq!(
            ref_frames(Preset::Ultrafast, Tuning::Animation, AvcLevel::Unrestricted, 1920, 1080),
            1
        );
        assert_eq!(
            ref_frames(Preset::Veryslow, Tuning::None, AvcLevel::L4_1, 1920, 1080),
            4
        );
    }

    #[test]
    fn test_weightp_defaults() {
        assert_eq!(weightp(Preset::Medium, Tuning::None, AvcProfile::High, false), 2);
        assert_eq!(weightp(Preset::Medium, Tuning::None, AvcProfile::High, true), 1);
        assert_eq!(weightp(Preset::Veryfast, Tuning::None, AvcProfile::High, false), 1);
        assert_eq!(weightp(Preset::Medium, Tuning::FastDecode, AvcProfile::High, false), 0);
        assert_eq!(weightp(Preset::Medium, Tuning::None, AvcProfile::Baseline, false), 0);
    }

    #[test]
    fn test_min_keyint_default() {
        assert_eq!(min_keyint(250, 25, 1), 25);
        assert_eq!(min_keyint(250, 30000, 1001), 25);
        assert_eq!(min_keyint(24, 24000, 1001), 2);
        assert_eq!(min_keyint(250, 25, 0), 0);
    }
}
