use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the external tools (x264, ffmpeg, ffprobe).
    pub tools_path: PathBuf,
    /// Scratch directory for multi-pass logs and intermediate files.
    pub work_dir: PathBuf,
    pub pipe_dir: PathBuf,
    pub decode_pipe_name: String,
    pub encode_pipe_name: String,
    pub process_priority: Priority,
    pub thread_priority: Priority,
    pub use_64bit_encoders: bool,
    pub x264_64bit_installed: bool,
    pub use_ffmpeg_scaling: bool,
    pub job_state_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
}

impl Priority {
    /// Unix nice value for this priority class.
    pub fn nice(self) -> i32 {
        match self {
            Priority::Idle => 19,
            Priority::BelowNormal => 10,
            Priority::Normal => 0,
            Priority::AboveNormal => -5,
            Priority::High => -10,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tools_path: PathBuf::from("/usr/bin"),
            work_dir: PathBuf::from("/var/lib/vconv/work"),
            pipe_dir: PathBuf::from("/tmp"),
            decode_pipe_name: "vconv_decode.pipe".to_string(),
            encode_pipe_name: "vconv_encode.pipe".to_string(),
            process_priority: Priority::BelowNormal,
            thread_priority: Priority::Normal,
            use_64bit_encoders: false,
            x264_64bit_installed: false,
            use_ffmpeg_scaling: false,
            job_state_dir: PathBuf::from("/var/lib/vconv/jobs"),
        }
    }
}

impl AppConfig {
    pub fn decode_pipe_path(&self) -> PathBuf {
        self.pipe_dir.join(&self.decode_pipe_name)
    }

    pub fn encode_pipe_path(&self) -> PathBuf {
        self.pipe_dir.join(&self.encode_pipe_name)
    }

    /// 64-bit binaries are used only when preferred, installed and runnable.
    pub fn use_64bit_encoder(&self) -> bool {
        self.use_64bit_encoders && self.x264_64bit_installed && is_64bit_host()
    }

    /// Full path of a tool, e.g. `x264` or its `x264_64` build.
    pub fn tool_path(&self, tool: &str, use_64bit: bool) -> PathBuf {
        let mut name = tool.to_string();
        if use_64bit {
            name.push_str("_64");
        }
        if cfg!(windows) {
            name.push_str(".exe");
        }
        self.tools_path.join(name)
    }
}

pub fn is_64bit_host() -> bool {
    cfg!(target_pointer_width = "64")
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = if let Some(config_path) = path {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

            toml::from_str::<AppConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?
        } else {
            #[cfg(not(test))]
            tracing::warn!("Config file not found at {:?}, using defaults", config_path);
            AppConfig::default()
        }
    } else {
        #[cfg(not(test))]
        tracing::info!("No config path provided, using defaults");
        AppConfig::default()
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.tools_path.as_os_str().is_empty() {
        anyhow::bail!("tools_path cannot be empty");
    }

    for (field, name) in [
        ("decode_pipe_name", &config.decode_pipe_name),
        ("encode_pipe_name", &config.encode_pipe_name),
    ] {
        if name.is_empty() {
            anyhow::bail!("{} cannot be empty", field);
        }
        if name.contains('/') || name.contains('\\') {
            anyhow::bail!("{} must be a file name, not a path", field);
        }
    }

    if config.decode_pipe_name == config.encode_pipe_name {
        anyhow::bail!("decode_pipe_name and encode_pipe_name must differ");
    }

    Ok(())
}
