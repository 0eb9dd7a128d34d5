// libx264-through-ffmpeg command builder

use super::custom::CustomLine;
use super::options::{Embedded, EncoderOption, OptionKey, OptionValue};
use super::{emitted_options, output_target, Dialect, EncoderInput};
use crate::resolve::EffectiveSettings;

pub fn render(
    settings: &EffectiveSettings,
    custom: &CustomLine,
    input: &EncoderInput,
    output: &str,
) -> Vec<String> {
    let (leading, trailing) = emitted_options(settings, custom, Dialect::Embedded);
    let geometry = &settings.geometry;

    let input = match input {
        EncoderInput::Stdin => "-".to_string(),
        EncoderInput::Path(path) => path.clone(),
    };
    let mut command = vec![
        "-i".to_string(),
        input,
        "-map".to_string(),
        "0:v".to_string(),
        "-vsync:v".to_string(),
        "1".to_string(),
        "-r:v".to_string(),
        format!("{}/{}", geometry.fps_num, geometry.fps_den),
        "-c:v".to_string(),
        "libx264".to_string(),
    ];

    let mut bundle = Vec::new();
    for option in &leading {
        push_option(&mut command, &mut bundle, option);
    }

    command.extend(custom.tokens_outside_bundle());

    for option in &trailing {
        push_option(&mut command, &mut bundle, option);
    }

    // Custom private options join the generated bundle so only one is passed
    bundle.extend(custom.bundle_entries().iter().cloned());
    bundle.push("force-cfr=1".to_string());

    let interlaced = leading
        .iter()
        .any(|o| matches!(o.key, OptionKey::Bff | OptionKey::Tff));
    if interlaced {
        command.push("-flags".to_string());
        command.push("+ildct".to_string());
    }

    command.push("-x264opts".to_string());
    command.push(bundle.join(":"));

    command.push("-bsf:v".to_string());
    command.push("h264_mp4toannexb".to_string());
    command.push("-y".to_string());

    if settings.writes_null_output() {
        command.push("-f".to_string());
        command.push("h264".to_string());
    }
    command.push(output_target(settings, output).to_string());

    command
}

fn value_text(value: &OptionValue) -> Option<String> {
    match value {
        OptionValue::Flag => None,
        OptionValue::Text(text) => Some(text.clone()),
        OptionValue::Level(level) => Some(level.compact()),
    }
}

fn push_option(command: &mut Vec<String>, bundle: &mut Vec<String>, option: &EncoderOption) {
    let value = value_text(&option.value);
    match option.key.embedded() {
        Embedded::Arg(name) => {
            command.push(format!("-{}", name));
            command.push(value.unwrap_or_else(|| "1".to_string()));
        }
        Embedded::Kbps(name) => {
            command.push(format!("-{}", name));
            command.push(format!("{}k", value.unwrap_or_default()));
        }
        Embedded::Fixed(name, fixed) => {
            command.push(format!("-{}", name));
            command.push(fixed.to_string());
        }
        Embedded::Private(key) => match value {
            Some(value) => bundle.push(format!("{}={}", key, value)),
            None => bundle.push(format!("{}=1", key)),
        },
        Embedded::Bare(key) => bundle.push(key.to_string()),
        Embedded::Filter(name) => {
            command.push("-vf".to_string());
            command.push(format!(
                "{}={}",
                name,
                value.unwrap_or_default().replace(':', "/")
            ));
        }
        Embedded::Led(lead, lead_value, name) => {
            command.push(format!("-{}", lead));
            command.push(lead_value.to_string());
            command.push(format!("-{}", name));
            command.push(value.unwrap_or_default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;
    use crate::encode::{build_command_line, null_sink, Dialect};
    use crate::profile::{AvcLevel, EncodingProfile, RateControl};
    use crate::resolve::resolve;
    use crate::stream::{StreamGeometry, VideoFormat};

    fn embedded_with(profile: EncodingProfile, geometry: StreamGeometry) -> Vec<String> {
        let settings = resolve(&profile, DeviceId::Default.capability(), &geometry, 0, 2);
        build_command_line(
            &settings,
            Dialect::Embedded,
            &EncoderInput::Path("/tmp/encode.pipe".into()),
            "out.264",
        )
    }

    fn embedded(profile: EncodingProfile) -> Vec<String> {
        let geometry = StreamGeometry {
            aspect_ratio: 16.0 / 9.0,
            ..Default::default()
        };
        embedded_with(profile, geometry)
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_prefix_and_tail() {
        let args = embedded(EncodingProfile::default());
        assert_eq!(
            &args[..10],
            &[
                "-i",
                "/tmp/encode.pipe",
                "-map",
                "0:v",
                "-vsync:v",
                "1",
                "-r:v",
                "25/1",
                "-c:v",
                "libx264"
            ]
        );
        assert_eq!(
            &args[args.len() - 6..],
            &[
                "-x264opts",
                "force-cfr=1",
                "-bsf:v",
                "h264_mp4toannexb",
                "-y",
                "out.264"
            ]
        );
        assert_eq!(value_after(&args, "-vf"), Some("setsar=1/1"));
    }

    #[test]
    fn test_spellings() {
        let profile = EncodingProfile {
            rate_control: RateControl::Abr,
            vbr_bitrate: 3000,
            avc_level: AvcLevel::L4_1,
            ref_frames: 2,
            max_gop: 48,
            psy_rd: 0.9,
            mbtree: false,
            ..Default::default()
        };
        let args = embedded(profile);
        assert_eq!(value_after(&args, "-profile:v"), Some("high"));
        assert_eq!(value_after(&args, "-level"), Some("41"));
        assert_eq!(value_after(&args, "-b:v"), Some("3000k"));
        assert_eq!(value_after(&args, "-refs"), Some("2"));
        assert_eq!(value_after(&args, "-psy"), Some("1"));
        assert_eq!(value_after(&args, "-psy-rd"), Some("0.90:0.00"));
        assert_eq!(value_after(&args, "-mbtree"), Some("0"));
        let bundle = value_after(&args, "-x264opts").unwrap();
        assert!(bundle.starts_with("keyint=48:"));
        assert!(bundle.ends_with(":force-cfr=1"));
    }

    #[test]
    fn test_interlaced_adds_ildct() {
        let geometry = StreamGeometry {
            width: 1920,
            height: 1080,
            format: VideoFormat::F1080i,
            aspect_ratio: 16.0 / 9.0,
            ..Default::default()
        };
        let args = embedded_with(EncodingProfile::default(), geometry);
        assert_eq!(value_after(&args, "-flags"), Some("+ildct"));
        let bundle = value_after(&args, "-x264opts").unwrap();
        assert!(bundle.split(':').any(|e| e == "bff=1"));
        assert!(bundle.split(':').any(|e| e == "colorprim=bt709"));
    }

    #[test]
    fn test_custom_bundle_merged_and_suppresses() {
        let profile = EncodingProfile {
            subme: 9,
            custom_command_line: "-x264opts subme=10 -an".to_string(),
            ..Default::default()
        };
        let args = embedded(profile);
        assert_eq!(args.iter().filter(|a| *a == "-x264opts").count(), 1);
        assert!(args.contains(&"-an".to_string()));
        let bundle = value_after(&args, "-x264opts").unwrap();
        assert_eq!(bundle, "subme=10:force-cfr=1");
    }

    #[test]
    fn test_custom_filter_chain_replaces_setsar() {
        let profile = EncodingProfile {
            custom_command_line: "-vf scale=1280:720".to_string(),
            ..Default::default()
        };
        let args = embedded(profile);
        assert_eq!(args.iter().filter(|a| *a == "-vf").count(), 1);
        assert_eq!(value_after(&args, "-vf"), Some("scale=1280:720"));
    }

    #[test]
    fn test_first_pass_null_output() {
        let profile = EncodingProfile {
            rate_control: RateControl::ThreePass,
            ..Default::default()
        };
        let geometry = StreamGeometry::default();
        let settings = resolve(&profile, DeviceId::Default.capability(), &geometry, 0, 1);
        let args = build_command_line(&settings, Dialect::Embedded, &EncoderInput::Stdin, "o");
        assert_eq!(&args[args.len() - 3..], &["-f", "h264", null_sink()]);
    }
}
