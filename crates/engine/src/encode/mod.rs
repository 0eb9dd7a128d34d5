pub mod custom;
pub mod embedded;
pub mod native;
pub mod options;

use serde::{Deserialize, Serialize};

use crate::resolve::EffectiveSettings;
use custom::CustomLine;
use options::{plan_options, EncoderOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `x264 --option value ... --output out -`
    #[default]
    Native,
    /// `ffmpeg -i in ... -c:v libx264 -x264opts a=b:c=d ... out`
    Embedded,
}

impl Dialect {
    /// Base name of the binary that runs this dialect.
    pub fn tool(self) -> &'static str {
        match self {
            Dialect::Native => "x264",
            Dialect::Embedded => "ffmpeg",
        }
    }

    /// First-pass statistics the encoder leaves in its working directory.
    pub fn stats_files(self) -> [&'static str; 2] {
        match self {
            Dialect::Native => ["x264_2pass.log", "x264_2pass.log.mbtree"],
            Dialect::Embedded => ["ffmpeg2pass-0.log", "ffmpeg2pass-0.log.mbtree"],
        }
    }
}

/// Where the encoder reads its y4m stream from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderInput {
    Stdin,
    Path(String),
}

pub fn null_sink() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

/// Build the argument list (without the program name) for one pass.
pub fn build_command_line(
    settings: &EffectiveSettings,
    dialect: Dialect,
    input: &EncoderInput,
    output: &str,
) -> Vec<String> {
    let custom = CustomLine::parse(&settings.profile.custom_command_line);
    match dialect {
        Dialect::Native => native::render(settings, &custom, input, output),
        Dialect::Embedded => embedded::render(settings, &custom, input, output),
    }
}

/// Planned options minus everything the custom line already sets, split
/// into the part written before the custom tokens and the trailing part.
fn emitted_options(
    settings: &EffectiveSettings,
    custom: &CustomLine,
    dialect: Dialect,
) -> (Vec<EncoderOption>, Vec<EncoderOption>) {
    plan_options(settings)
        .into_iter()
        .filter(|option| !custom.covers(option.key, dialect))
        .partition(|option| !option.key.is_trailing())
}

/// Output target for this pass: the null sink for pass 1 of a multi-pass job.
fn output_target<'a>(settings: &EffectiveSettings, output: &'a str) -> &'a str {
    if settings.writes_null_output() {
        null_sink()
    } else {
        output
    }
}
