use serde::{Deserialize, Serialize};

use crate::profile::CanonicalSar;

const MAX_DENOMINATOR: u64 = 1000;
const TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleAspect {
    Canonical(CanonicalSar),
    Custom(u32, u32),
}

impl SampleAspect {
    pub fn ratio(self) -> (u32, u32) {
        match self {
            SampleAspect::Canonical(sar) => sar.ratio(),
            SampleAspect::Custom(x, y) => (x, y),
        }
    }
}

/// Best rational approximation of `value` by continued fractions.
pub fn approximate_ratio(value: f64) -> (u32, u32) {
    if !value.is_finite() || value <= 0.0 {
        return (1, 1);
    }

    // Convergents h/k
    let (mut h_prev, mut h) = (1u64, value.floor() as u64);
    let (mut k_prev, mut k) = (0u64, 1u64);
    let mut remainder = value - value.floor();

    while remainder > f64::EPSILON && ((h as f64 / k as f64) - value).abs() > TOLERANCE {
        let inverse = 1.0 / remainder;
        let a = inverse.floor() as u64;
        let next_k = a.saturating_mul(k).saturating_add(k_prev);
        if next_k > MAX_DENOMINATOR {
            break;
        }
        let next_h = a.saturating_mul(h).saturating_add(h_prev);
        (h_prev, h) = (h, next_h);
        (k_prev, k) = (k, next_k);
        remainder = inverse - inverse.floor();
    }

    if h == 0 {
        return (1, k.max(1) as u32);
    }
    (h as u32, k as u32)
}

/// Pixel aspect ratio for a frame of `width` x `height` shown at `dar`.
pub fn sample_aspect(dar: f64, width: u32, height: u32) -> SampleAspect {
    if width == 0 || height == 0 {
        return SampleAspect::Canonical(CanonicalSar::Square);
    }
    let (x, y) = approximate_ratio(dar * height as f64 / width as f64);
    match CanonicalSar::from_ratio(x, y) {
        Some(sar) => SampleAspect::Canonical(sar),
        None => SampleAspect::Custom(x, y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_pixels_1080p() {
        assert_eq!(
            sample_aspect(16.0 / 9.0, 1920, 1080),
            SampleAspect::Canonical(CanonicalSar::Square)
        );
    }

    #[test]
    fn test_pal_widescreen_dvd() {
        // 720x576 shown at 16:9 -> 64:45
        assert_eq!(
            sample_aspect(16.0 / 9.0, 720, 576),
            SampleAspect::Canonical(CanonicalSar::R64x45)
        );
    }

    #[test]
    fn test_ntsc_widescreen_dvd() {
        // 720x480 at 16:9 -> 32:27
        assert_eq!(
            sample_aspect(16.0 / 9.0, 720, 480),
            SampleAspect::Canonical(CanonicalSar::R32x27)
        );
    }

    #[test]
    fn test_anamorphic_1440_is_4_3() {
        assert_eq!(
            sample_aspect(16.0 / 9.0, 1440, 1080),
            SampleAspect::Canonical(CanonicalSar::R4x3)
        );
    }

    #[test]
    fn test_non_canonical_ratio() {
        // 1.5 at 1:1 storage
        assert_eq!(sample_aspect(1.5, 100, 100), SampleAspect::Custom(3, 2));
    }

    #[test]
    fn test_approximate_ratio_integers() {
        assert_eq!(approximate_ratio(2.0), (2, 1));
        assert_eq!(approximate_ratio(1.0), (1, 1));
        assert_eq!(approximate_ratio(0.0), (1, 1));
    }
}
