// Native x264 command builder

use super::custom::CustomLine;
use super::options::{EncoderOption, OptionValue};
use super::{emitted_options, output_target, Dialect, EncoderInput};
use crate::resolve::EffectiveSettings;

pub fn render(
    settings: &EffectiveSettings,
    custom: &CustomLine,
    input: &EncoderInput,
    output: &str,
) -> Vec<String> {
    let (leading, trailing) = emitted_options(settings, custom, Dialect::Native);

    let mut command = Vec::new();
    for option in &leading {
        push_option(&mut command, option);
    }

    // Custom tokens go after every generated option they could collide with
    command.extend(custom.tokens().iter().cloned());

    for option in &trailing {
        push_option(&mut command, option);
    }

    command.push("--output".to_string());
    command.push(output_target(settings, output).to_string());

    match input {
        EncoderInput::Stdin => {
            command.push("--demuxer".to_string());
            command.push("y4m".to_string());
            command.push("-".to_string());
        }
        EncoderInput::Path(path) => command.push(path.clone()),
    }

    command
}

fn push_option(command: &mut Vec<String>, option: &EncoderOption) {
    command.push(format!("--{}", option.key.native_name()));
    match &option.value {
        OptionValue::Flag => {}
        OptionValue::Text(value) => command.push(value.clone()),
        OptionValue::Level(level) => command.push(level.dotted().to_string()),
    }
}
