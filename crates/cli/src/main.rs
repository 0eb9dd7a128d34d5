use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vconv_engine::config::{load_config, AppConfig};
use vconv_engine::device::all_devices;
use vconv_engine::encode::{build_command_line, null_sink, Dialect, EncoderInput};
use vconv_engine::jobs::{create_job, save_job, EncodeJob};
use vconv_engine::probe::parse_frame_rate;
use vconv_engine::profile::load_profile;
use vconv_engine::resolve::resolve;
use vconv_engine::startup::probe_version;
use vconv_engine::stream::{StreamGeometry, VideoFormat};
use vconv_engine::{run_all_passes, Orchestrator};

#[derive(Parser, Debug)]
#[command(name = "vconv")]
#[command(about = "x264 encode runner", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every pass of an encode
    Encode(JobArgs),
    /// Print the encoder command line of one pass without running it
    Command {
        #[command(flatten)]
        job: JobArgs,
        /// Pass to render
        #[arg(long, default_value_t = 1)]
        pass: u8,
    },
    /// List the target device table
    Devices,
    /// Show the installed encoder versions
    Versions,
}

#[derive(ClapArgs, Debug)]
struct JobArgs {
    /// Encoding profile (TOML); x264 defaults when omitted
    #[arg(short, long, value_name = "FILE")]
    profile: Option<PathBuf>,
    /// Input artifact handed to the decoder
    #[arg(short, long)]
    input: PathBuf,
    /// Raw H.264 output stream
    #[arg(short, long)]
    output: PathBuf,
    #[arg(long, default_value_t = 1920)]
    width: u32,
    #[arg(long, default_value_t = 1080)]
    height: u32,
    /// Frame rate as N/D
    #[arg(long, default_value = "25/1", value_parser = parse_rate)]
    fps: (u32, u32),
    /// Source format tag (480i, 576p, 1080i, ...)
    #[arg(long, default_value = "unknown", value_parser = parse_format)]
    format: VideoFormat,
    /// Display aspect ratio; 0 derives it from the resolution
    #[arg(long, default_value_t = 0.0)]
    aspect: f64,
    /// Frame count, used for progress percentages
    #[arg(long, default_value_t = 0)]
    frames: u64,
    /// Target bitrate in kbit/s; 0 uses the profile's
    #[arg(long, default_value_t = 0)]
    bitrate: u32,
    /// native (x264) or embedded (ffmpeg/libx264)
    #[arg(long, default_value = "native", value_parser = parse_dialect)]
    dialect: Dialect,
}

fn parse_rate(value: &str) -> Result<(u32, u32), String> {
    parse_frame_rate(value).ok_or_else(|| format!("invalid frame rate '{}', expected N/D", value))
}

fn parse_format(value: &str) -> Result<VideoFormat, String> {
    match value {
        "unknown" => Ok(VideoFormat::Unknown),
        "480i" => Ok(VideoFormat::F480i),
        "480p" => Ok(VideoFormat::F480p),
        "576i" => Ok(VideoFormat::F576i),
        "576p" => Ok(VideoFormat::F576p),
        "720p" => Ok(VideoFormat::F720p),
        "1080i" => Ok(VideoFormat::F1080i),
        "1080p" => Ok(VideoFormat::F1080p),
        other => Err(format!("unknown video format '{}'", other)),
    }
}

fn parse_dialect(value: &str) -> Result<Dialect, String> {
    match value {
        "native" | "x264" => Ok(Dialect::Native),
        "embedded" | "ffmpeg" => Ok(Dialect::Embedded),
        other => Err(format!("unknown dialect '{}'", other)),
    }
}

fn build_job(args: &JobArgs) -> Result<EncodeJob> {
    let profile = match &args.profile {
        Some(path) => load_profile(path)
            .with_context(|| format!("Failed to load profile {:?}", path))?,
        None => Default::default(),
    };
    let geometry = StreamGeometry {
        width: args.width,
        height: args.height,
        fps_num: args.fps.0,
        fps_den: args.fps.1,
        format: args.format,
        aspect_ratio: args.aspect,
        frame_count: args.frames,
        ..Default::default()
    };

    let mut job = create_job(profile, geometry, args.input.clone(), args.output.clone());
    job.dialect = args.dialect;
    job.target_bitrate = args.bitrate;
    job.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(job)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with levels, RUST_LOG overrides the default
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_ansi(true)
        .init();

    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    match args.command {
        Commands::Encode(job_args) => encode(config, &job_args).await,
        Commands::Command { job, pass } => print_command(&config, &job, pass),
        Commands::Devices => {
            print_devices();
            Ok(())
        }
        Commands::Versions => {
            print_versions(&config).await;
            Ok(())
        }
    }
}

async fn encode(config: AppConfig, args: &JobArgs) -> Result<()> {
    let job = build_job(args)?;
    let state_dir = config.job_state_dir.clone();
    info!(
        "Encoding {:?} -> {:?} ({} pass(es), {})",
        job.input_path,
        job.output_path,
        job.total_passes,
        job.dialect.tool()
    );

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(Arc::new(config), events_tx);

    let run = run_all_passes(&orchestrator, &mut events_rx, job, |progress| {
        println!(
            "pass {} {:>6.2}% frame {}/{} {:.2} fps (avg {:.2}) {:.2} kb/s eta {}s",
            progress.pass,
            progress.percent,
            progress.current_frame,
            progress.total_frames,
            progress.fps,
            progress.average_fps,
            progress.bitrate_kbps,
            progress.remaining.as_secs()
        );
    });
    tokio::pin!(run);

    let completed = tokio::select! {
        completed = &mut run => completed,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping encoder");
            orchestrator.stop();
            run.await
        }
    };

    if let Err(e) = save_job(&completed.job, &state_dir) {
        error!("Failed to save job state: {}", e);
    }

    if !completed.success {
        anyhow::bail!(
            "Encode could not be started: {}",
            completed.error.unwrap_or(completed.message)
        );
    }
    match completed.job.exit_code {
        Some(0) => {
            info!(
                "Encode finished in {:.1}s, output {:?}",
                completed.job.elapsed.as_secs_f64(),
                completed.job.output_path
            );
            Ok(())
        }
        code => anyhow::bail!("Encoder failed with exit code {:?}", code),
    }
}

fn print_command(config: &AppConfig, args: &JobArgs, pass: u8) -> Result<()> {
    let mut job = build_job(args)?;
    job.pass = pass;
    job.validate().map_err(|e| anyhow::anyhow!(e))?;

    let settings = resolve(
        &job.profile,
        job.profile.device.capability(),
        &job.geometry,
        job.target_bitrate,
        job.pass,
    );
    let input = match job.dialect {
        Dialect::Native => EncoderInput::Stdin,
        Dialect::Embedded => {
            EncoderInput::Path(config.encode_pipe_path().to_string_lossy().into_owned())
        }
    };
    let output = job.output_path.to_string_lossy().into_owned();
    let command = build_command_line(&settings, job.dialect, &input, &output);
    let program = config.tool_path(job.dialect.tool(), config.use_64bit_encoder());

    println!("{} {}", program.display(), command.join(" "));
    if settings.writes_null_output() {
        info!("Pass {} writes to {}", pass, null_sink());
    }
    Ok(())
}

fn print_devices() {
    let limit = |value: Option<u32>| value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
    println!(
        "{:<14} {:>8} {:>5} {:>8} {:>8} {:>8} {:>8}",
        "device", "bframes", "refs", "vbv-buf", "vbv-max", "gop(s)", "bluray"
    );
    for device in all_devices() {
        println!(
            "{:<14} {:>8} {:>5} {:>8} {:>8} {:>8} {:>8}",
            device.name,
            limit(device.max_bframes),
            limit(device.max_ref_frames),
            limit(device.vbv_bufsize),
            limit(device.vbv_maxrate),
            limit(device.max_gop_seconds),
            if device.bluray { "yes" } else { "no" }
        );
    }
}

async fn print_versions(config: &AppConfig) {
    for dialect in [Dialect::Native, Dialect::Embedded] {
        for use_64bit in [false, true] {
            let version = probe_version(config, dialect, use_64bit).await;
            let name = if use_64bit {
                format!("{}_64", dialect.tool())
            } else {
                dialect.tool().to_string()
            };
            if version.is_empty() {
                println!("{:<10} not found", name);
            } else {
                println!("{:<10} {}", name, version);
            }
        }
    }
}
