// Encoder option catalogue and per-option emission rules

use std::collections::BTreeSet;

use super::Dialect;
use crate::profile::{
    AvcLevel, AvcProfile, BPyramid, InterlaceMode, NalHrd, Preset, QuantMatrix, RateControl,
    Tuning, VuiRange,
};
use crate::resolve::{defaults, EffectiveSettings};
use crate::stream::StereoMode;

/// How an option is spelled by the embedded (libx264 through ffmpeg) front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Embedded {
    /// `-name value`
    Arg(&'static str),
    /// `-name {value}k`
    Kbps(&'static str),
    /// `-name fixed`, for switch options
    Fixed(&'static str, &'static str),
    /// `key=value` inside the private bundle; switches render as `key=1`
    Private(&'static str),
    /// `key` alone inside the private bundle
    Bare(&'static str),
    /// `-vf name=X/Y`
    Filter(&'static str),
    /// `-lead lead_value -name value`
    Led(&'static str, &'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    Profile,
    Level,
    BlurayCompat,
    Preset,
    Tune,
    Bitrate,
    Qp,
    Pass,
    Crf,
    SlowFirstPass,
    ThreadInput,
    Threads,
    Deblock,
    NoDeblock,
    NoCabac,
    Keyint,
    MinKeyint,
    OpenGop,
    Bframes,
    BAdapt,
    BPyramid,
    NoWeightb,
    BBias,
    Scenecut,
    NoScenecut,
    Ref,
    Weightp,
    Slices,
    SliceMaxSize,
    SliceMaxMbs,
    QpMin,
    QpMax,
    QpStep,
    IpRatio,
    PbRatio,
    ChromaQpOffset,
    VbvBufsize,
    VbvMaxrate,
    VbvInit,
    Ratetol,
    Qcomp,
    Cplxblur,
    Qblur,
    DeadzoneInter,
    DeadzoneIntra,
    NoMbtree,
    RcLookahead,
    AqMode,
    AqStrength,
    Cqm,
    NoChromaMe,
    Merange,
    Me,
    Direct,
    Nr,
    Subme,
    Partitions,
    No8x8dct,
    Trellis,
    PsyRd,
    NoMixedRefs,
    NoDctDecimate,
    NoFastPskip,
    NoPsy,
    Aud,
    NalHrd,
    NonDeterministic,
    Psnr,
    Ssim,
    Range,
    Bff,
    Tff,
    FakeInterlaced,
    PicStruct,
    Colorprim,
    Transfer,
    Colormatrix,
    Pulldown,
    Sar,
    FramePacking,
}

impl OptionKey {
    /// Native long-option name (without `--`) and embedded spelling.
    pub fn forms(self) -> (&'static str, Embedded) {
        use Embedded::*;
        use OptionKey as K;
        match self {
            K::Profile => ("profile", Arg("profile:v")),
            K::Level => ("level", Arg("level")),
            K::BlurayCompat => ("bluray-compat", Fixed("bluray-compat", "1")),
            K::Preset => ("preset", Arg("preset")),
            K::Tune => ("tune", Arg("tune")),
            K::Bitrate => ("bitrate", Kbps("b:v")),
            K::Qp => ("qp", Arg("qp")),
            K::Pass => ("pass", Arg("pass")),
            K::Crf => ("crf", Arg("crf")),
            K::SlowFirstPass => ("slow-firstpass", Fixed("fastfirstpass", "0")),
            K::ThreadInput => ("thread-input", Private("thread-input")),
            K::Threads => ("threads", Arg("threads")),
            K::Deblock => ("deblock", Arg("deblock")),
            K::NoDeblock => ("no-deblock", Private("no-deblock")),
            K::NoCabac => ("no-cabac", Private("no-cabac")),
            K::Keyint => ("keyint", Private("keyint")),
            K::MinKeyint => ("min-keyint", Private("min-keyint")),
            K::OpenGop => ("open-gop", Private("open-gop")),
            K::Bframes => ("bframes", Private("bframes")),
            K::BAdapt => ("b-adapt", Private("b-adapt")),
            K::BPyramid => ("b-pyramid", Arg("b-pyramid")),
            K::NoWeightb => ("no-weightb", Fixed("weightb", "0")),
            K::BBias => ("b-bias", Arg("b-bias")),
            K::Scenecut => ("scenecut", Private("scenecut")),
            K::NoScenecut => ("no-scenecut", Private("no-scenecut")),
            K::Ref => ("ref", Arg("refs")),
            K::Weightp => ("weightp", Arg("weightp")),
            K::Slices => ("slices", Private("slices")),
            K::SliceMaxSize => ("slice-max-size", Arg("slice-max-size")),
            K::SliceMaxMbs => ("slice-max-mbs", Private("slice-max-mbs")),
            K::QpMin => ("qpmin", Private("qpmin")),
            K::QpMax => ("qpmax", Private("qpmax")),
            K::QpStep => ("qpstep", Private("qpstep")),
            K::IpRatio => ("ipratio", Private("ipratio")),
            K::PbRatio => ("pbratio", Private("pbratio")),
            K::ChromaQpOffset => ("chroma-qp-offset", Private("chroma-qp-offset")),
            K::VbvBufsize => ("vbv-bufsize", Private("vbv-bufsize")),
            K::VbvMaxrate => ("vbv-maxrate", Private("vbv-maxrate")),
            K::VbvInit => ("vbv-init", Private("vbv-init")),
            K::Ratetol => ("ratetol", Private("ratetol")),
            K::Qcomp => ("qcomp", Private("qcomp")),
            K::Cplxblur => ("cplxblur", Arg("cplxblur")),
            K::Qblur => ("qblur", Private("qblur")),
            K::DeadzoneInter => ("deadzone-inter", Private("deadzone-inter")),
            K::DeadzoneIntra => ("deadzone-intra", Private("deadzone-intra")),
            K::NoMbtree => ("no-mbtree", Fixed("mbtree", "0")),
            K::RcLookahead => ("rc-lookahead", Arg("rc-lookahead")),
            K::AqMode => ("aq-mode", Arg("aq-mode")),
            K::AqStrength => ("aq-strength", Arg("aq-strength")),
            K::Cqm => ("cqm", Private("cqm")),
            K::NoChromaMe => ("no-chroma-me", Private("no-chroma-me")),
            K::Merange => ("merange", Private("merange")),
            K::Me => ("me", Private("me")),
            K::Direct => ("direct", Arg("direct-pred")),
            K::Nr => ("nr", Private("nr")),
            K::Subme => ("subme", Private("subme")),
            K::Partitions => ("partitions", Arg("partitions")),
            K::No8x8dct => ("no-8x8dct", Fixed("8x8dct", "0")),
            K::Trellis => ("trellis", Private("trellis")),
            K::PsyRd => ("psy-rd", Led("psy", "1", "psy-rd")),
            K::NoMixedRefs => ("no-mixed-refs", Fixed("mixed-refs", "0")),
            K::NoDctDecimate => ("no-dct-decimate", Private("no-dct-decimate")),
            K::NoFastPskip => ("no-fast-pskip", Fixed("fast-pskip", "0")),
            K::NoPsy => ("no-psy", Fixed("psy", "0")),
            K::Aud => ("aud", Fixed("aud", "1")),
            K::NalHrd => ("nal-hrd", Arg("nal-hrd")),
            K::NonDeterministic => ("non-deterministic", Bare("non-deterministic")),
            K::Psnr => ("psnr", Private("psnr")),
            K::Ssim => ("ssim", Fixed("ssim", "1")),
            K::Range => ("range", Private("range")),
            K::Bff => ("bff", Private("bff")),
            K::Tff => ("tff", Private("tff")),
            K::FakeInterlaced => ("fake-interlaced", Private("fake-interlaced")),
            K::PicStruct => ("pic-struct", Private("pic-struct")),
            K::Colorprim => ("colorprim", Private("colorprim")),
            K::Transfer => ("transfer", Private("transfer")),
            K::Colormatrix => ("colormatrix", Private("colormatrix")),
            K::Pulldown => ("pulldown", Private("pulldown")),
            K::Sar => ("sar", Filter("setsar")),
            K::FramePacking => ("frame-packing", Private("frame-packing")),
        }
    }

    pub fn native_name(self) -> &'static str {
        self.forms().0
    }

    pub fn embedded(self) -> Embedded {
        self.forms().1
    }

    /// Options that contradict each other share a suppression group.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            OptionKey::Bff | OptionKey::Tff => &["bff", "tff"],
            OptionKey::Deblock | OptionKey::NoDeblock => &["deblock", "no-deblock"],
            OptionKey::Scenecut | OptionKey::NoScenecut => &["scenecut", "no-scenecut"],
            _ => &[],
        }
    }

    /// Every bare token name (no leading dashes) that refers to this option
    /// on a `dialect` command line. A custom command line naming any of them
    /// suppresses it. Embedded lines keep the native name too, since
    /// private-option bundles spell options the x264 way.
    pub fn token_names(self, dialect: Dialect) -> BTreeSet<&'static str> {
        let mut names = BTreeSet::from([self.native_name()]);
        names.extend(self.aliases());
        if dialect == Dialect::Native {
            return names;
        }
        match self.embedded() {
            Embedded::Arg(name)
            | Embedded::Kbps(name)
            | Embedded::Fixed(name, _)
            | Embedded::Private(name)
            | Embedded::Bare(name) => {
                names.insert(name);
            }
            Embedded::Filter(name) => {
                names.insert(name);
                names.insert("vf");
            }
            Embedded::Led(lead, _, name) => {
                names.insert(lead);
                names.insert(name);
            }
        }
        names
    }

    /// Written after the custom command line, next to the output path.
    pub fn is_trailing(self) -> bool {
        matches!(self, OptionKey::Sar | OptionKey::FramePacking)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Flag,
    Text(String),
    Level(AvcLevel),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOption {
    pub key: OptionKey,
    pub value: OptionValue,
}

#[derive(Default)]
struct Plan(Vec<EncoderOption>);

impl Plan {
    fn flag(&mut self, key: OptionKey) {
        self.0.push(EncoderOption {
            key,
            value: OptionValue::Flag,
        });
    }

    fn value(&mut self, key: OptionKey, value: impl ToString) {
        self.0.push(EncoderOption {
            key,
            value: OptionValue::Text(value.to_string()),
        });
    }
}

/// Options to emit for these settings, in section order, before custom
/// command-line suppression.
pub fn plan_options(s: &EffectiveSettings) -> Vec<EncoderOption> {
    let mut plan = Plan::default();
    profile_section(s, &mut plan);
    rate_control_section(s, &mut plan);
    threading_section(s, &mut plan);
    frame_type_section(s, &mut plan);
    rate_tuning_section(s, &mut plan);
    analysis_section(s, &mut plan);
    output_section(s, &mut plan);
    trailing_section(s, &mut plan);
    plan.0
}

fn profile_section(s: &EffectiveSettings, plan: &mut Plan) {
    let p = &s.profile;
    plan.value(OptionKey::Profile, p.avc_profile.as_str());
    if s.level.is_restricted() {
        plan.0.push(EncoderOption {
            key: OptionKey::Level,
            value: OptionValue::Level(s.level),
        });
    }
    if p.bluray_compat {
        plan.flag(OptionKey::BlurayCompat);
    }
    if p.preset != Preset::Medium {
        plan.value(OptionKey::Preset, p.preset.as_str());
    }
    if let Some(tune) = p.tuning.as_str() {
        plan.value(OptionKey::Tune, tune);
    }
}

fn rate_control_section(s: &EffectiveSettings, plan: &mut Plan) {
    let p = &s.profile;
    match p.rate_control {
        RateControl::Abr => plan.value(OptionKey::Bitrate, s.bitrate),
        RateControl::ConstantQuantizer => plan.value(OptionKey::Qp, p.quantizer),
        RateControl::TwoPass | RateControl::ThreePass => {
            plan.value(OptionKey::Pass, s.pass);
            plan.value(OptionKey::Bitrate, s.bitrate);
        }
        RateControl::Crf => {
            if p.crf != defaults::DEFAULT_CRF {
                plan.value(OptionKey::Crf, p.crf);
            }
        }
    }

    if p.slow_first_pass && p.preset < Preset::Placebo && p.rate_control.is_multipass() {
        plan.flag(OptionKey::SlowFirstPass);
    }
}

fn threading_section(s: &EffectiveSettings, plan: &mut Plan) {
    let p = &s.profile;
    if p.thread_input && p.threads == 1 {
        plan.flag(OptionKey::ThreadInput);
    }
    if p.threads > 0 {
        plan.value(OptionKey::Threads, p.threads);
    }
}

fn frame_type_section(s: &EffectiveSettings, plan: &mut Plan) {
    let p = &s.profile;
    let fast_decode = p.tuning == Tuning::FastDecode;
    let ultrafast = p.preset == Preset::Ultrafast;

    if p.deblocking {
        if (p.deblock_strength, p.deblock_threshold) != defaults::deblock(p.tuning) {
            plan.value(
                OptionKey::Deblock,
                format!("{}:{}", p.deblock_strength, p.deblock_threshold),
            );
        }
    } else if !ultrafast && !fast_decode {
        plan.flag(OptionKey::NoDeblock);
    }

    if p.avc_profile > AvcProfile::Baseline && !p.cabac && !ultrafast && !fast_decode {
        plan.flag(OptionKey::NoCabac);
    }

    if s.keyint != defaults::DEFAULT_KEYINT {
        if s.keyint == 0 {
            plan.value(OptionKey::Keyint, "infinite");
        } else {
            plan.value(OptionKey::Keyint, s.keyint);
        }
    }

    if !p.bluray_compat
        && s.min_keyint != defaults::min_keyint(s.keyint, s.geometry.fps_num, s.geometry.fps_den)
    {
        plan.value(OptionKey::MinKeyint, s.min_keyint);
    }

    if p.open_gop || p.bluray_compat {
        plan.flag(OptionKey::OpenGop);
    }

    let default_bframes = defaults::bframes(p.preset, p.tuning, p.avc_profile, &s.device);
    if p.avc_profile > AvcProfile::Baseline && s.bframes != default_bframes {
        plan.value(OptionKey::Bframes, s.bframes);
    }

    if s.bframes > 0 {
        if p.b_adapt != defaults::b_adapt(p.preset) {
            plan.value(OptionKey::BAdapt, p.b_adapt);
        }
        let pyramid_default = if p.bluray_compat {
            BPyramid::Strict
        } else {
            BPyramid::Normal
        };
        if s.bframes > 1 && s.b_pyramid != pyramid_default {
            plan.value(OptionKey::BPyramid, s.b_pyramid.as_str());
        }
        if !p.weighted_b && !fast_decode && !ultrafast {
            plan.flag(OptionKey::NoWeightb);
        }
    }

    if p.b_bias != 0 {
        plan.value(OptionKey::BBias, p.b_bias);
    }

    if p.adaptive_scenecut {
        if p.scenecut != defaults::scenecut(p.preset) {
            plan.value(OptionKey::Scenecut, p.scenecut);
        }
    } else if !ultrafast {
        plan.flag(OptionKey::NoScenecut);
    }

    let default_refs = defaults::ref_frames(
        p.preset,
        p.tuning,
        s.level,
        s.geometry.width,
        s.geometry.height,
    );
    if s.ref_frames != default_refs {
        plan.value(OptionKey::Ref, s.ref_frames);
    }

    if s.weightp != defaults::weightp(p.preset, p.tuning, p.avc_profile, p.bluray_compat) {
        plan.value(OptionKey::Weightp, s.weightp);
    }

    if s.slices != 0 {
        plan.value(OptionKey::Slices, s.slices);
    }
    if p.slice_max_size != 0 {
        plan.value(OptionKey::SliceMaxSize, p.slice_max_size);
    }
    if p.slice_max_mbs != 0 {
        plan.value(OptionKey::SliceMaxMbs, p.slice_max_mbs);
    }
}

fn rate_tuning_section(s: &EffectiveSettings, plan: &mut Plan) {
    let p = &s.profile;
    let grain = p.tuning == Tuning::Grain;
    let quantizer = p.rate_control == RateControl::ConstantQuantizer;

    if p.qp_min != defaults::DEFAULT_QP_MIN {
        plan.value(OptionKey::QpMin, p.qp_min);
    }
    if p.qp_max != defaults::DEFAULT_QP_MAX {
        plan.value(OptionKey::QpMax, p.qp_max);
    }
    if p.qp_step != defaults::DEFAULT_QP_STEP {
        plan.value(OptionKey::QpStep, p.qp_step);
    }

    let grain_ratio = |value: f32| grain && defaults::same(value, defaults::GRAIN_RATIO);
    if !defaults::same(p.ip_ratio, defaults::DEFAULT_IP_RATIO) && !grain_ratio(p.ip_ratio) {
        plan.value(OptionKey::IpRatio, format!("{:.2}", p.ip_ratio));
    }
    if !defaults::same(p.pb_ratio, defaults::DEFAULT_PB_RATIO) && !grain_ratio(p.pb_ratio) {
        plan.value(OptionKey::PbRatio, format!("{:.2}", p.pb_ratio));
    }

    if p.chroma_qp_offset != 0 {
        plan.value(OptionKey::ChromaQpOffset, p.chroma_qp_offset);
    }

    if !quantizer {
        if s.vbv_bufsize > 0 {
            plan.value(OptionKey::VbvBufsize, s.vbv_bufsize);
        }
        if s.vbv_maxrate > 0 {
            plan.value(OptionKey::VbvMaxrate, s.vbv_maxrate);
        }
        if !defaults::same(p.vbv_init, defaults::DEFAULT_VBV_INIT) {
            plan.value(OptionKey::VbvInit, format!("{:.1}", p.vbv_init));
        }
        if !defaults::same(p.ratetol, defaults::DEFAULT_RATETOL) {
            plan.value(OptionKey::Ratetol, format!("{:.1}", p.ratetol));
        }
        if !defaults::same(p.qcomp, defaults::qcomp(p.tuning)) {
            plan.value(OptionKey::Qcomp, format!("{:.2}", p.qcomp));
        }
        if p.rate_control.is_multipass() {
            if p.cplxblur != defaults::DEFAULT_CPLXBLUR {
                plan.value(OptionKey::Cplxblur, p.cplxblur);
            }
            if !defaults::same(p.qblur, defaults::DEFAULT_QBLUR) {
                plan.value(OptionKey::Qblur, format!("{:.1}", p.qblur));
            }
        }
    }

    let (inter, intra) = defaults::deadzones(p.tuning);
    if p.deadzone_inter != inter {
        plan.value(OptionKey::DeadzoneInter, p.deadzone_inter);
    }
    if p.deadzone_intra != intra {
        plan.value(OptionKey::DeadzoneIntra, p.deadzone_intra);
    }

    if !p.mbtree {
        if p.preset > Preset::Ultrafast {
            plan.flag(OptionKey::NoMbtree);
        }
    } else if p.rc_lookahead != defaults::rc_lookahead(p.preset) {
        plan.value(OptionKey::RcLookahead, p.rc_lookahead);
    }

    if !quantizer {
        if p.aq_mode != defaults::aq_mode(p.preset, p.tuning) {
            plan.value(OptionKey::AqMode, p.aq_mode);
        }
        if p.aq_mode > 0 && !defaults::same(p.aq_strength, defaults::aq_strength(p.tuning)) {
            plan.value(OptionKey::AqStrength, format!("{:.1}", p.aq_strength));
        }
    }
}

fn analysis_section(s: &EffectiveSettings, plan: &mut Plan) {
    let p = &s.profile;

    if p.quant_matrix == QuantMatrix::Jvt && p.avc_profile == AvcProfile::High {
        plan.value(OptionKey::Cqm, "jvt");
    }
    if !p.chroma_me {
        plan.flag(OptionKey::NoChromaMe);
    }
    if p.merange != defaults::merange(p.preset) {
        plan.value(OptionKey::Merange, p.merange);
    }
    if p.me != defaults::motion_estimation(p.preset) {
        plan.value(OptionKey::Me, p.me.as_str());
    }
    if p.direct != defaults::direct(p.preset) {
        plan.value(OptionKey::Direct, p.direct.as_str());
    }
    if p.noise_reduction > 0 {
        plan.value(OptionKey::Nr, p.noise_reduction);
    }
    if p.subme != defaults::subme(p.preset) {
        plan.value(OptionKey::Subme, p.subme);
    }
    if p.partitions != defaults::partitions(p.preset, p.tuning, p.avc_profile) {
        plan.value(OptionKey::Partitions, p.partitions.describe());
    }
    if p.avc_profile == AvcProfile::High && !p.dct8x8 && p.preset > Preset::Ultrafast {
        plan.flag(OptionKey::No8x8dct);
    }
    if p.trellis != defaults::trellis(p.preset) {
        plan.value(OptionKey::Trellis, p.trellis);
    }

    if p.psy && p.subme > 5 {
        let (strength, trellis) = defaults::psy_rd(p.tuning);
        if !defaults::same(p.psy_rd, strength) || !defaults::same(p.psy_trellis, trellis) {
            plan.value(
                OptionKey::PsyRd,
                format!("{:.2}:{:.2}", p.psy_rd, p.psy_trellis),
            );
        }
    }

    if !p.mixed_refs && p.preset >= Preset::Fast {
        plan.flag(OptionKey::NoMixedRefs);
    }
    if !p.dct_decimate && p.tuning != Tuning::Grain {
        plan.flag(OptionKey::NoDctDecimate);
    }
    if !p.fast_pskip && p.preset != Preset::Placebo {
        plan.flag(OptionKey::NoFastPskip);
    }
    if !p.psy && !matches!(p.tuning, Tuning::Psnr | Tuning::Ssim) {
        plan.flag(OptionKey::NoPsy);
    }

    // --bluray-compat already implies aud and vbr hrd
    if s.aud && !p.bluray_compat {
        plan.flag(OptionKey::Aud);
    }
    match s.nal_hrd {
        NalHrd::Vbr if !p.bluray_compat => plan.value(OptionKey::NalHrd, "vbr"),
        NalHrd::Cbr => plan.value(OptionKey::NalHrd, "cbr"),
        _ => {}
    }

    if p.non_deterministic {
        plan.flag(OptionKey::NonDeterministic);
    }
    if p.psnr {
        plan.flag(OptionKey::Psnr);
    }
    if p.ssim {
        plan.flag(OptionKey::Ssim);
    }
    match p.range {
        VuiRange::Tv => plan.value(OptionKey::Range, "tv"),
        VuiRange::Pc => plan.value(OptionKey::Range, "pc"),
        VuiRange::Auto => {}
    }
}

fn output_section(s: &EffectiveSettings, plan: &mut Plan) {
    let progressive = s.interlace <= InterlaceMode::Progressive;
    match s.interlace {
        InterlaceMode::Bff => plan.flag(OptionKey::Bff),
        InterlaceMode::Tff => plan.flag(OptionKey::Tff),
        _ => {}
    }
    if s.fake_interlaced && progressive {
        plan.flag(OptionKey::FakeInterlaced);
    }
    if s.force_pic_struct && progressive && !s.pulldown.is_active() {
        plan.flag(OptionKey::PicStruct);
    }

    if let Some(primaries) = s.color_primaries.as_str() {
        plan.value(OptionKey::Colorprim, primaries);
    }
    if let Some(transfer) = s.transfer.as_str() {
        plan.value(OptionKey::Transfer, transfer);
    }
    if let Some(matrix) = s.color_matrix.as_str() {
        plan.value(OptionKey::Colormatrix, matrix);
    }
    if let Some(pulldown) = s.pulldown.as_str() {
        plan.value(OptionKey::Pulldown, pulldown);
    }
}

fn trailing_section(s: &EffectiveSettings, plan: &mut Plan) {
    if let Some(sar) = s.sar {
        let (x, y) = sar.ratio();
        plan.value(OptionKey::Sar, format!("{}:{}", x, y));
    }
    if s.geometry.stereo != StereoMode::None {
        plan.value(OptionKey::FramePacking, 3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;
    use crate::profile::EncodingProfile;
    use crate::resolve::resolve;
    use crate::stream::StreamGeometry;

    fn settings(profile: EncodingProfile) -> EffectiveSettings {
        let geometry = StreamGeometry {
            aspect_ratio: 16.0 / 9.0,
            ..Default::default()
        };
        resolve(&profile, DeviceId::Default.capability(), &geometry, 0, 1)
    }

    fn keys(profile: EncodingProfile) -> Vec<OptionKey> {
        plan_options(&settings(profile))
            .into_iter()
            .map(|o| o.key)
            .collect()
    }

    fn value_of(profile: EncodingProfile, key: OptionKey) -> Option<OptionValue> {
        plan_options(&settings(profile))
            .into_iter()
            .find(|o| o.key == key)
            .map(|o| o.value)
    }

    #[test]
    fn test_default_profile_is_minimal() {
        assert_eq!(
            keys(EncodingProfile::default()),
            vec![OptionKey::Profile, OptionKey::Sar]
        );
    }

    #[test]
    fn test_crf_only_when_not_23() {
        let profile = EncodingProfile {
            crf: 20,
            ..Default::default()
        };
        assert_eq!(
            value_of(profile, OptionKey::Crf),
            Some(OptionValue::Text("20".into()))
        );
    }

    #[test]
    fn test_two_pass_emits_pass_and_bitrate() {
        let profile = EncodingProfile {
            rate_control: RateControl::TwoPass,
            vbr_bitrate: 4000,
            ..Default::default()
        };
        let plan = plan_options(&settings(profile));
        assert_eq!(plan[1].key, OptionKey::Pass);
        assert_eq!(plan[2].key, OptionKey::Bitrate);
        assert_eq!(plan[2].value, OptionValue::Text("4000".into()));
    }

    #[test]
    fn test_infinite_keyint() {
        let profile = EncodingProfile {
            max_gop: 0,
            ..Default::default()
        };
        assert_eq!(
            value_of(profile, OptionKey::Keyint),
            Some(OptionValue::Text("infinite".into()))
        );
    }

    #[test]
    fn test_tuning_default_deblock_not_emitted() {
        let profile = EncodingProfile {
            tuning: Tuning::Film,
            deblock_strength: -1,
            deblock_threshold: -1,
            psy_trellis: 0.15,
            ..Default::default()
        };
        let keys = keys(profile);
        assert!(!keys.contains(&OptionKey::Deblock));
        assert!(!keys.contains(&OptionKey::PsyRd));
    }

    #[test]
    fn test_no_deblock_skipped_for_fastdecode() {
        let profile = EncodingProfile {
            deblocking: false,
            tuning: Tuning::FastDecode,
            ..Default::default()
        };
        assert!(!keys(profile).contains(&OptionKey::NoDeblock));

        let profile = EncodingProfile {
            deblocking: false,
            ..Default::default()
        };
        assert!(keys(profile).contains(&OptionKey::NoDeblock));
    }

    #[test]
    fn test_psy_rd_needs_high_subme() {
        let profile = EncodingProfile {
            psy_rd: 0.8,
            subme: 5,
            ..Default::default()
        };
        assert!(!keys(profile).contains(&OptionKey::PsyRd));

        let profile = EncodingProfile {
            psy_rd: 0.8,
            psy_trellis: 0.1,
            ..Default::default()
        };
        assert_eq!(
            value_of(profile, OptionKey::PsyRd),
            Some(OptionValue::Text("0.80:0.10".into()))
        );
    }

    #[test]
    fn test_partitions_rendering() {
        let profile = EncodingProfile {
            partitions: crate::profile::Partitions::ALL,
            ..Default::default()
        };
        assert_eq!(
            value_of(profile, OptionKey::Partitions),
            Some(OptionValue::Text("all".into()))
        );
    }

    #[test]
    fn test_quantizer_mode_skips_vbv_and_aq() {
        let profile = EncodingProfile {
            rate_control: RateControl::ConstantQuantizer,
            vbv_bufsize: 5000,
            aq_mode: 2,
            ..Default::default()
        };
        let keys = keys(profile);
        assert!(keys.contains(&OptionKey::Qp));
        assert!(!keys.contains(&OptionKey::VbvBufsize));
        assert!(!keys.contains(&OptionKey::AqMode));
    }

    #[test]
    fn test_grain_ratio_treated_as_default() {
        let profile = EncodingProfile {
            tuning: Tuning::Grain,
            ip_ratio: 1.1,
            pb_ratio: 1.1,
            ..Default::default()
        };
        let keys = keys(profile);
        assert!(!keys.contains(&OptionKey::IpRatio));
        assert!(!keys.contains(&OptionKey::PbRatio));
    }

    #[test]
    fn test_bluray_compat_suppresses_aud_and_vbr() {
        let profile = EncodingProfile {
            bluray_compat: true,
            aud: true,
            nal_hrd: NalHrd::Vbr,
            ..Default::default()
        };
        let keys = keys(profile);
        assert!(keys.contains(&OptionKey::BlurayCompat));
        assert!(keys.contains(&OptionKey::OpenGop));
        assert!(!keys.contains(&OptionKey::Aud));
        assert!(!keys.contains(&OptionKey::NalHrd));
        assert!(!keys.contains(&OptionKey::MinKeyint));
    }

    #[test]
    fn test_bluray_compat_never_asks_for_normal_pyramid() {
        let profile = EncodingProfile {
            bluray_compat: true,
            b_pyramid: BPyramid::Normal,
            bframes: 3,
            ..Default::default()
        };
        assert_eq!(value_of(profile.clone(), OptionKey::BPyramid), None);

        let profile = EncodingProfile {
            b_pyramid: BPyramid::None,
            ..profile
        };
        assert_eq!(
            value_of(profile, OptionKey::BPyramid),
            Some(OptionValue::Text("none".to_string()))
        );
    }

    #[test]
    fn test_stereo_adds_frame_packing_last() {
        let profile = EncodingProfile::default();
        let geometry = StreamGeometry {
            stereo: StereoMode::SideBySide,
            ..Default::default()
        };
        let s = resolve(&profile, DeviceId::Default.capability(), &geometry, 0, 1);
        let plan = plan_options(&s);
        assert_eq!(plan.last().map(|o| o.key), Some(OptionKey::FramePacking));
    }

    #[test]
    fn test_token_names_per_dialect() {
        let names = OptionKey::Ref.token_names(Dialect::Embedded);
        assert!(names.contains("ref"));
        assert!(names.contains("refs"));
        assert!(!OptionKey::Ref.token_names(Dialect::Native).contains("refs"));

        let names = OptionKey::Tff.token_names(Dialect::Native);
        assert!(names.contains("bff"));

        let names = OptionKey::Sar.token_names(Dialect::Embedded);
        assert!(names.contains("setsar"));
        assert!(names.contains("vf"));

        // x264's own --vf filter chain says nothing about the aspect ratio
        let names = OptionKey::Sar.token_names(Dialect::Native);
        assert_eq!(names, BTreeSet::from(["sar"]));
    }
}
