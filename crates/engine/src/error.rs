use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the encode orchestrator.
///
/// These never escape `Orchestrator::start`/`stop`; they are rendered into
/// the completion event payload or logged.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} is already encoding")]
    AlreadyEncoding(String),

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pipe {path:?}: {source}")]
    Pipe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process {tool} did not expose its {stream} stream")]
    MissingStdio {
        tool: String,
        stream: &'static str,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid encode job: {0}")]
    InvalidJob(String),

    #[error("{0} is not supported on this platform")]
    UnsupportedPlatform(&'static str),

    #[error("decoder exited with {0}")]
    DecoderFailed(String),

    #[error("no tokio runtime to run the encode on")]
    NoRuntime,
}

impl EngineError {
    pub fn spawn(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            tool: tool.into(),
            source,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn pipe(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Pipe {
            path: path.into(),
            source,
        }
    }
}
