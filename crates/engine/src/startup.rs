// Encoder version lookup; failures yield an empty string

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::config::{is_64bit_host, AppConfig};
use crate::encode::Dialect;

pub const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

static X264_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^x264.+?(\d)\.(\d+)\.([\dM]+)").expect("valid regex")
});

static FFMPEG_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ffmpeg version ([\w.\-]+)[, ]").expect("valid regex")
});

/// "x264 0.164.3095M baf4d2e" → "Core: 164 Build 3095M"
pub fn parse_x264_version(output: &str) -> Option<String> {
    let caps = X264_VERSION.captures(output)?;
    Some(format!("Core: {} Build {}", &caps[2], &caps[3]))
}

/// "ffmpeg version 6.1.1-3ubuntu5 Copyright …" → "6.1.1-3ubuntu5"
pub fn parse_ffmpeg_version(output: &str) -> Option<String> {
    FFMPEG_VERSION
        .captures(output)
        .map(|caps| caps[1].to_string())
}

/// Version string of the encoder used by `dialect`, or `""` when it cannot
/// be determined. The 64-bit build is only looked for on 64-bit hosts.
pub async fn probe_version(config: &AppConfig, dialect: Dialect, use_64bit: bool) -> String {
    if use_64bit && !is_64bit_host() {
        return String::new();
    }

    let program = config.tool_path(dialect.tool(), use_64bit);
    let version = match dialect {
        Dialect::Native => {
            probe_program(&program, &["--version"], VERSION_PROBE_TIMEOUT, parse_x264_version).await
        }
        Dialect::Embedded => {
            probe_program(&program, &["-version"], VERSION_PROBE_TIMEOUT, parse_ffmpeg_version)
                .await
        }
    };

    if use_64bit {
        debug!("Selected 64 bit encoder");
    }
    debug!("{} \"{}\" found", dialect.tool(), version);
    version
}

/// Run `program`, parse its standard output, and force-kill it if it is
/// still alive after `limit`.
pub async fn probe_program(
    program: &Path,
    args: &[&str],
    limit: Duration,
    parse: fn(&str) -> Option<String>,
) -> String {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            error!("{} exception: {}", program.display(), e);
            return String::new();
        }
    };

    let Some(mut stdout) = child.stdout.take() else {
        return String::new();
    };

    let mut output = Vec::new();
    let finished = tokio::time::timeout(limit, async {
        stdout.read_to_end(&mut output).await?;
        child.wait().await
    })
    .await;

    match finished {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Version probe of {} failed: {}", program.display(), e),
        Err(_) => {
            warn!("Version probe of {} timed out, killing it", program.display());
            if let Err(e) = child.kill().await {
                error!("Failed to kill {}: {}", program.display(), e);
            }
        }
    }

    parse(&String::from_utf8_lossy(&output)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_x264_version() {
        assert_eq!(
            parse_x264_version("x264 0.164.3095M baf4d2e\n(libswscale 7.5.100)\n").as_deref(),
            Some("Core: 164 Build 3095M")
        );
        assert_eq!(
            parse_x264_version("garbage\nx264 0.157.2969 d4099dd\n").as_deref(),
            Some("Core: 157 Build 2969")
        );
        assert_eq!(parse_x264_version("not an encoder"), None);
    }

    #[test]
    fn test_parse_ffmpeg_version() {
        assert_eq!(
            parse_ffmpeg_version("ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023").as_deref(),
            Some("6.1.1-3ubuntu5")
        );
        assert_eq!(
            parse_ffmpeg_version("ffmpeg version n7.0, Copyright").as_deref(),
            Some("n7.0")
        );
        assert_eq!(parse_ffmpeg_version("ffprobe version 6.1"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_yields_empty_string() {
        let config = AppConfig {
            tools_path: "/nonexistent/vconv/tools".into(),
            ..Default::default()
        };
        assert_eq!(probe_version(&config, Dialect::Native, false).await, "");
        assert_eq!(probe_version(&config, Dialect::Embedded, false).await, "");
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_reads_fake_encoder() {
        let dir = tempfile::TempDir::new().unwrap();
        script(dir.path(), "x264", "echo 'x264 0.164.3095M baf4d2e'");
        let config = AppConfig {
            tools_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert_eq!(
            probe_version(&config, Dialect::Native, false).await,
            "Core: 164 Build 3095M"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_probe_is_killed() {
        let started = std::time::Instant::now();
        let version = probe_program(
            Path::new("/bin/sh"),
            &["-c", "exec sleep 30"],
            Duration::from_millis(200),
            parse_x264_version,
        )
        .await;
        assert_eq!(version, "");
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
