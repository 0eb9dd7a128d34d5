// x264 encode engine: parameter resolution, command synthesis and the
// decode → pipe → encode harness

pub mod config;
pub mod decode;
pub mod device;
pub mod encode;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod pipe;
pub mod priority;
pub mod probe;
pub mod profile;
pub mod progress;
pub mod relay;
pub mod resolve;
pub mod startup;
pub mod stream;

// Re-export commonly used types
pub use config::AppConfig;
pub use encode::{build_command_line, Dialect, EncoderInput};
pub use error::EngineError;
pub use jobs::{create_job, EncodeJob};
pub use orchestrator::{run_all_passes, EncodeCompleted, EncodeEvent, Orchestrator};
pub use profile::EncodingProfile;
pub use resolve::{resolve, EffectiveSettings};
pub use stream::StreamGeometry;
