//! Target playback devices and the encoder limits they impose.

use serde::{Deserialize, Serialize};

use crate::profile::BPyramid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceId {
    #[default]
    Default,
    Avchd,
    BluRay,
    DivxPlusHd,
    Dxva,
    Xbox360,
    Ps3,
    AppleTv,
    Iphone,
}

/// Encoding limits of one target device. `None` means "no constraint".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapability {
    pub id: DeviceId,
    pub name: &'static str,
    pub max_bframes: Option<u32>,
    pub max_ref_frames: Option<u32>,
    pub vbv_bufsize: Option<u32>,
    pub vbv_maxrate: Option<u32>,
    /// GOP ceiling in seconds of frame rate.
    pub max_gop_seconds: Option<u32>,
    pub b_pyramid: Option<BPyramid>,
    pub bluray: bool,
}

const UNCONSTRAINED: DeviceCapability = DeviceCapability {
    id: DeviceId::Default,
    name: "Default",
    max_bframes: None,
    max_ref_frames: None,
    vbv_bufsize: None,
    vbv_maxrate: None,
    max_gop_seconds: None,
    b_pyramid: None,
    bluray: false,
};

static DEVICES: [DeviceCapability; 9] = [
    UNCONSTRAINED,
    DeviceCapability {
        id: DeviceId::Avchd,
        name: "AVCHD",
        max_bframes: Some(3),
        max_ref_frames: Some(4),
        vbv_bufsize: Some(14000),
        vbv_maxrate: Some(14000),
        max_gop_seconds: Some(1),
        b_pyramid: Some(BPyramid::Strict),
        bluray: true,
    },
    DeviceCapability {
        id: DeviceId::BluRay,
        name: "Blu-ray",
        max_bframes: Some(3),
        max_ref_frames: Some(4),
        vbv_bufsize: Some(30000),
        vbv_maxrate: Some(40000),
        max_gop_seconds: Some(1),
        b_pyramid: Some(BPyramid::Strict),
        bluray: true,
    },
    DeviceCapability {
        id: DeviceId::DivxPlusHd,
        name: "DivX Plus HD",
        max_bframes: Some(3),
        max_ref_frames: Some(4),
        vbv_bufsize: Some(25000),
        vbv_maxrate: Some(20000),
        max_gop_seconds: Some(4),
        b_pyramid: Some(BPyramid::None),
        bluray: false,
    },
    DeviceCapability {
        id: DeviceId::Dxva,
        name: "DXVA",
        max_ref_frames: Some(16),
        vbv_bufsize: Some(50000),
        vbv_maxrate: Some(50000),
        ..UNCONSTRAINED
    },
    DeviceCapability {
        id: DeviceId::Xbox360,
        name: "Xbox 360",
        max_bframes: Some(3),
        max_ref_frames: Some(3),
        vbv_bufsize: Some(24000),
        vbv_maxrate: Some(24000),
        b_pyramid: Some(BPyramid::None),
        ..UNCONSTRAINED
    },
    DeviceCapability {
        id: DeviceId::Ps3,
        name: "PlayStation 3",
        max_bframes: Some(3),
        max_ref_frames: Some(4),
        vbv_bufsize: Some(31250),
        vbv_maxrate: Some(31250),
        ..UNCONSTRAINED
    },
    DeviceCapability {
        id: DeviceId::AppleTv,
        name: "Apple TV",
        max_bframes: Some(3),
        max_ref_frames: Some(4),
        vbv_bufsize: Some(10000),
        vbv_maxrate: Some(10000),
        b_pyramid: Some(BPyramid::None),
        ..UNCONSTRAINED
    },
    DeviceCapability {
        id: DeviceId::Iphone,
        name: "iPhone",
        max_bframes: Some(0),
        max_ref_frames: Some(1),
        vbv_bufsize: Some(2500),
        vbv_maxrate: Some(2500),
        ..UNCONSTRAINED
    },
];

impl DeviceId {
    /// Static capability record for this device.
    pub fn capability(self) -> &'static DeviceCapability {
        let index = match self {
            DeviceId::Default => 0,
            DeviceId::Avchd => 1,
            DeviceId::BluRay => 2,
            DeviceId::DivxPlusHd => 3,
            DeviceId::Dxva => 4,
            DeviceId::Xbox360 => 5,
            DeviceId::Ps3 => 6,
            DeviceId::AppleTv => 7,
            DeviceId::Iphone => 8,
        };
        &DEVICES[index]
    }
}

/// The full device registry, in display order.
pub fn all_devices() -> &'static [DeviceCapability] {
    &DEVICES
}
