// Decoder -> decode pipe -> relay -> encoder, one pass at a time

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle as ThreadHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::decode::{decode_request, DecoderFactory, FfmpegDecoder, ProcessSpec};
use crate::encode::{build_command_line, Dialect, EncoderInput};
use crate::error::EngineError;
use crate::jobs::{EncodeJob, START_FAILED_EXIT_CODE};
use crate::pipe::{ConnectionWatch, PipeChannel, PipeEnd};
use crate::priority::set_process_priority;
use crate::probe::{FfprobeProbe, MediaProbe};
use crate::progress::{EncodeProgress, LineSplitter, ProgressParser};
use crate::relay::{spawn_relay, RelayReport, RelaySink};
use crate::resolve::resolve;

/// How long trailing encoder output is still read after the encoder exits.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize)]
pub enum EncodeEvent {
    Started,
    Progress(EncodeProgress),
    Completed(EncodeCompleted),
}

/// Terminal event of a pass. `success` reports whether the orchestration
/// ran; whether the encode worked is `job.exit_code`.
#[derive(Debug, Clone, Serialize)]
pub struct EncodeCompleted {
    pub success: bool,
    pub error: Option<String>,
    pub message: String,
    pub job: EncodeJob,
}

pub struct Orchestrator {
    config: Arc<AppConfig>,
    decoder: Arc<dyn DecoderFactory>,
    probe: Arc<dyn MediaProbe>,
    events: mpsc::UnboundedSender<EncodeEvent>,
    active: Arc<AtomicBool>,
    stop: watch::Sender<bool>,
    relay_stop: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Orchestrator using ffmpeg to decode and ffprobe to re-probe.
    pub fn new(config: Arc<AppConfig>, events: mpsc::UnboundedSender<EncodeEvent>) -> Self {
        let use_64bit = config.use_64bit_encoder();
        let decoder = Arc::new(FfmpegDecoder::from_config(&config));
        let probe = Arc::new(FfprobeProbe::new(config.tool_path("ffprobe", use_64bit)));
        Self::with_collaborators(config, decoder, probe, events)
    }

    pub fn with_collaborators(
        config: Arc<AppConfig>,
        decoder: Arc<dyn DecoderFactory>,
        probe: Arc<dyn MediaProbe>,
        events: mpsc::UnboundedSender<EncodeEvent>,
    ) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            config,
            decoder,
            probe,
            events,
            active: Arc::new(AtomicBool::new(false)),
            stop,
            relay_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_encoding(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start one pass of `job` in the background on the current tokio
    /// runtime. A second start while a job runs, or a start outside any
    /// runtime, spawns nothing and is answered with a failed `Completed`
    /// event.
    pub fn start(&self, job: EncodeJob) {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let err = EngineError::AlreadyEncoding(job.dialect.tool().to_string());
            self.reject(job, err);
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                self.active.store(false, Ordering::SeqCst);
                self.reject(job, EngineError::NoRuntime);
                return;
            }
        };

        self.stop.send_replace(false);
        self.relay_stop.store(false, Ordering::SeqCst);

        let runner = PassRunner {
            config: Arc::clone(&self.config),
            decoder: Arc::clone(&self.decoder),
            probe: Arc::clone(&self.probe),
            events: self.events.clone(),
            active: Arc::clone(&self.active),
            stop: self.stop.subscribe(),
            relay_stop: Arc::clone(&self.relay_stop),
        };
        runtime.spawn(runner.run(job));
    }

    /// Kill the running decoder and encoder. Safe to call at any time, any
    /// number of times.
    pub fn stop(&self) {
        if self.is_encoding() {
            info!("Stopping encode");
        }
        self.relay_stop.store(true, Ordering::SeqCst);
        self.stop.send_replace(true);
    }

    fn reject(&self, mut job: EncodeJob, err: EngineError) {
        error!("{}", err);
        job.exit_code = Some(START_FAILED_EXIT_CODE);
        self.send(EncodeEvent::Completed(EncodeCompleted {
            success: false,
            error: Some(err.to_string()),
            message: err.to_string(),
            job,
        }));
    }

    fn send(&self, event: EncodeEvent) {
        if self.events.send(event).is_err() {
            debug!("No event subscriber left");
        }
    }
}

/// Everything one pass needs, detached from the orchestrator.
struct PassRunner {
    config: Arc<AppConfig>,
    decoder: Arc<dyn DecoderFactory>,
    probe: Arc<dyn MediaProbe>,
    events: mpsc::UnboundedSender<EncodeEvent>,
    active: Arc<AtomicBool>,
    stop: watch::Receiver<bool>,
    relay_stop: Arc<AtomicBool>,
}

/// Processes and threads of a pass that has started.
struct RunningPass {
    decoder: Child,
    encoder: Child,
    decode_watch: ConnectionWatch,
    relay: ThreadHandle<RelayReport>,
    readers: Vec<JoinHandle<()>>,
    lines: mpsc::UnboundedReceiver<String>,
    // Removed from disk once the pass is over
    _pipes: Vec<PipeChannel>,
}

/// How a started pass ended.
struct PassOutcome {
    encoder: io::Result<ExitStatus>,
    decoder_error: Option<EngineError>,
}

impl PassRunner {
    async fn run(mut self, mut job: EncodeJob) {
        let started = Instant::now();
        job.started_at = Some(Utc::now());

        let running = match self.start_processes(&job) {
            Ok(running) => running,
            Err(err) => {
                error!("Failed to start {}: {}", job.dialect.tool(), err);
                job.exit_code = Some(START_FAILED_EXIT_CODE);
                job.finished_at = Some(Utc::now());
                self.active.store(false, Ordering::SeqCst);
                self.send(EncodeEvent::Completed(EncodeCompleted {
                    success: false,
                    error: Some(err.to_string()),
                    message: err.to_string(),
                    job,
                }));
                return;
            }
        };

        self.send(EncodeEvent::Started);

        let outcome = self.supervise(running, &mut job, started).await;
        match &outcome.encoder {
            Ok(status) => {
                job.exit_code = Some(status.code().unwrap_or(START_FAILED_EXIT_CODE));
            }
            Err(e) => {
                error!("Lost track of {}: {}", job.dialect.tool(), e);
                job.exit_code = Some(START_FAILED_EXIT_CODE);
            }
        }
        info!("Exit Code: {}", job.exit_code.unwrap_or(START_FAILED_EXIT_CODE));

        if let Some(err) = outcome.decoder_error {
            // An encoder fed an empty stream may still exit cleanly
            if job.encode_succeeded() {
                job.exit_code = Some(START_FAILED_EXIT_CODE);
            }
            job.elapsed = started.elapsed();
            job.finished_at = Some(Utc::now());
            self.active.store(false, Ordering::SeqCst);
            self.send(EncodeEvent::Completed(EncodeCompleted {
                success: false,
                error: Some(err.to_string()),
                message: err.to_string(),
                job,
            }));
            return;
        }

        if job.encode_succeeded() && job.is_final_pass() {
            self.finalize_output(&mut job).await;
        }

        job.completed = true;
        job.elapsed = started.elapsed();
        job.finished_at = Some(Utc::now());
        self.active.store(false, Ordering::SeqCst);
        self.send(EncodeEvent::Completed(EncodeCompleted {
            success: true,
            error: None,
            message: String::new(),
            job,
        }));
    }

    /// Resolve, render, create the pipes and launch decoder then encoder.
    fn start_processes(&self, job: &EncodeJob) -> Result<RunningPass, EngineError> {
        job.validate().map_err(EngineError::InvalidJob)?;

        let config = &self.config;
        let dialect = job.dialect;
        let settings = resolve(
            &job.profile,
            job.profile.device.capability(),
            &job.geometry,
            job.target_bitrate,
            job.pass,
        );

        std::fs::create_dir_all(&config.work_dir)
            .map_err(|e| EngineError::io(format!("work dir {}", config.work_dir.display()), e))?;

        // Pipes and their connection waits come before any process starts.
        // Connections are declared after `pipes` so an early return aborts
        // them while the FIFOs still exist.
        let mut pipes = vec![PipeChannel::create(&config.decode_pipe_path())?];
        let decode_conn = pipes[0].connect(PipeEnd::Read);
        let decode_watch = decode_conn.watch();

        let (input, encode_conn) = match dialect {
            Dialect::Native => (EncoderInput::Stdin, None),
            Dialect::Embedded => {
                let encode_pipe = PipeChannel::create(&config.encode_pipe_path())?;
                let conn = encode_pipe.connect(PipeEnd::Write);
                let input = EncoderInput::Path(encode_pipe.path().to_string_lossy().into_owned());
                pipes.push(encode_pipe);
                (input, Some(conn))
            }
        };

        let output = job.output_path.to_string_lossy().into_owned();
        let args = build_command_line(&settings, dialect, &input, &output);
        let program = config.tool_path(dialect.tool(), config.use_64bit_encoder());
        info!("start parameter: {} {}", dialect.tool(), args.join(" "));

        let decode_spec = self.decoder.decode_process(&decode_request(
            config,
            &job.input_path,
            &job.geometry,
            job.crop,
        ));
        info!("decoder parameter: {}", decode_spec.display());

        let mut decoder = spawn_decoder(&decode_spec)?;
        let mut encoder = {
            let mut command = Command::new(&program);
            command
                .args(&args)
                .current_dir(&config.work_dir)
                .stdin(match dialect {
                    Dialect::Native => Stdio::piped(),
                    Dialect::Embedded => Stdio::null(),
                })
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            command
                .spawn()
                .map_err(|e| EngineError::spawn(dialect.tool(), e))?
        };

        for child in [&decoder, &encoder] {
            if let Some(pid) = child.id() {
                set_process_priority(pid, config.process_priority);
            }
        }

        let sink = match encode_conn {
            Some(conn) => RelaySink::Pipe(conn),
            None => {
                let stdin = encoder.stdin.take().ok_or_else(|| EngineError::MissingStdio {
                    tool: dialect.tool().to_string(),
                    stream: "stdin",
                })?;
                let stdin = blocking_stdin(stdin)
                    .map_err(|e| EngineError::io("encoder stdin", e))?;
                RelaySink::Stdin(stdin)
            }
        };
        let relay = spawn_relay(
            decode_conn,
            sink,
            Arc::clone(&self.relay_stop),
            config.thread_priority,
        )
        .map_err(|e| EngineError::io("relay thread", e))?;

        let stdout = take_stdio(encoder.stdout.take(), dialect.tool(), "stdout")?;
        let stderr = take_stdio(encoder.stderr.take(), dialect.tool(), "stderr")?;
        let (line_tx, lines) = mpsc::unbounded_channel();
        let stdout_tx = line_tx.clone();
        let mut readers = vec![
            spawn_line_reader(stdout, move |line| stdout_tx.send(line).is_ok()),
            spawn_line_reader(stderr, move |line| line_tx.send(line).is_ok()),
        ];
        if let Some(stderr) = decoder.stderr.take() {
            readers.push(spawn_line_reader(stderr, |line| {
                debug!("decoder: {}", line);
                true
            }));
        }

        Ok(RunningPass {
            decoder,
            encoder,
            decode_watch,
            relay,
            readers,
            lines,
            _pipes: pipes,
        })
    }

    /// Feed encoder output to the progress parser until the encoder exits,
    /// then tear the pass down. A decoder that exits first ends the
    /// encoder's input; one that fails takes the encoder down with it.
    async fn supervise(
        &mut self,
        mut running: RunningPass,
        job: &mut EncodeJob,
        started: Instant,
    ) -> PassOutcome {
        let mut parser = ProgressParser::new(job.dialect, job.pass, job.geometry.frame_count);
        let mut stop_listening = true;
        let mut stopping = false;
        let mut decoder_running = true;
        let mut decoder_error = None;

        let status = loop {
            tokio::select! {
                status = running.encoder.wait() => break status,
                decoded = running.decoder.wait(), if decoder_running => {
                    decoder_running = false;
                    let failure = match decoded {
                        Ok(decoded) if decoded.success() => {
                            debug!("Decoder exited: {}", decoded);
                            None
                        }
                        Ok(decoded) => Some(decoded.to_string()),
                        Err(e) => Some(e.to_string()),
                    };
                    if let Some(reason) = failure.filter(|_| !stopping) {
                        // An encoder that already died took the decoder's reader with it
                        if let Ok(Some(status)) = running.encoder.try_wait() {
                            if !status.success() {
                                debug!("Decoder exited after the encoder: {}", reason);
                                break Ok(status);
                            }
                        }
                        error!("Decoder failed: {}", reason);
                        decoder_error = Some(EngineError::DecoderFailed(reason));
                        self.relay_stop.store(true, Ordering::SeqCst);
                        kill(&mut running.encoder, job.dialect.tool());
                    }
                    if !running.decode_watch.is_settled() {
                        warn!(
                            "Decoder exited without opening {}",
                            running.decode_watch.path().display()
                        );
                    }
                    // Nothing more will arrive on the decode pipe
                    running.decode_watch.release();
                }
                Some(line) = running.lines.recv() => {
                    self.handle_line(&mut parser, &line, job, started);
                }
                changed = self.stop.changed(), if stop_listening => {
                    if changed.is_err() {
                        // Orchestrator dropped; let the pass run to its end
                        stop_listening = false;
                        continue;
                    }
                    let requested = *self.stop.borrow_and_update();
                    if requested {
                        stop_listening = false;
                        stopping = true;
                        kill(&mut running.encoder, job.dialect.tool());
                        kill(&mut running.decoder, "decoder");
                    }
                }
            }
        };

        // Whatever the encoder printed last is still in flight
        let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, async {
            while let Some(line) = running.lines.recv().await {
                self.handle_line(&mut parser, &line, job, started);
            }
        })
        .await;
        for reader in &running.readers {
            reader.abort();
        }

        self.relay_stop.store(true, Ordering::SeqCst);
        match running.decoder.try_wait() {
            Ok(Some(decoder_status)) => {
                debug!("Decoder exited: {}", decoder_status);
                let encoded = matches!(&status, Ok(encoder_status) if encoder_status.success());
                if decoder_running && encoded && !stopping && !decoder_status.success() {
                    error!("Decoder failed: {}", decoder_status);
                    decoder_error = Some(EngineError::DecoderFailed(decoder_status.to_string()));
                }
            }
            Ok(None) => {
                warn!("Decoder still running after the encoder exited, killing it");
                if let Err(e) = running.decoder.kill().await {
                    error!("Failed to kill decoder: {}", e);
                }
            }
            Err(e) => error!("Failed to query decoder: {}", e),
        }

        let relay = running.relay;
        match tokio::task::spawn_blocking(move || relay.join()).await {
            Ok(Ok(report)) => debug!("Relay finished: {:?}", report),
            Ok(Err(_)) => error!("Relay thread panicked"),
            Err(e) => error!("Failed to join relay thread: {}", e),
        }

        PassOutcome {
            encoder: status,
            decoder_error,
        }
    }

    fn handle_line(
        &self,
        parser: &mut ProgressParser,
        line: &str,
        job: &mut EncodeJob,
        started: Instant,
    ) {
        if let Some(progress) = parser.parse_line(line, started.elapsed()) {
            job.elapsed = progress.elapsed;
            job.remaining = progress.remaining;
            self.send(EncodeEvent::Progress(progress));
        }
    }

    /// Bookkeeping after the final pass produced the output.
    async fn finalize_output(&self, job: &mut EncodeJob) {
        job.output_produced = true;
        if let Some(previous) = job.stream_file.take() {
            job.register_temp_file(previous);
        }
        job.stream_file = Some(job.output_path.clone());

        match self.probe.probe(&job.output_path).await {
            Ok(result) => result.apply_to(&mut job.geometry),
            Err(e) => error!("Failed to probe {}: {:#}", job.output_path.display(), e),
        }

        let work_dir = &self.config.work_dir;
        let mut artifacts: Vec<PathBuf> = job
            .dialect
            .stats_files()
            .iter()
            .map(|name| work_dir.join(name))
            .collect();
        artifacts.extend(
            [&job.script_path, &job.index_file, &job.stereo_config]
                .into_iter()
                .flatten()
                .cloned(),
        );
        for artifact in artifacts {
            job.register_temp_file(artifact);
        }
    }

    fn send(&self, event: EncodeEvent) {
        if self.events.send(event).is_err() {
            debug!("No event subscriber left");
        }
    }
}

fn spawn_decoder(spec: &ProcessSpec) -> Result<Child, EngineError> {
    Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| EngineError::spawn(spec.program.to_string_lossy(), e))
}

fn take_stdio<T>(stream: Option<T>, tool: &str, name: &'static str) -> Result<T, EngineError> {
    stream.ok_or_else(|| EngineError::MissingStdio {
        tool: tool.to_string(),
        stream: name,
    })
}

/// Forcibly terminate `child`; errors are logged, never returned.
fn kill(child: &mut Child, name: &str) {
    match child.try_wait() {
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(e) = child.start_kill() {
                error!("Failed to kill {}: {}", name, e);
            }
        }
        Err(e) => error!("Failed to query {}: {}", name, e),
    }
}

/// Read `stream` until it closes, handing each `\r`/`\n` separated line to
/// `on_line` until it returns false.
fn spawn_line_reader<R, F>(mut stream: R, mut on_line: F) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: FnMut(String) -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut splitter = LineSplitter::default();
        let mut buffer = vec![0u8; 4096];
        loop {
            let read = match stream.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!("Output reader stopped: {}", e);
                    break;
                }
            };
            for line in splitter.push(&buffer[..read]) {
                if !on_line(line) {
                    return;
                }
            }
        }
        if let Some(line) = splitter.finish() {
            on_line(line);
        }
    })
}

/// The encoder's stdin as a blocking file the relay thread can write to.
#[cfg(unix)]
fn blocking_stdin(stdin: tokio::process::ChildStdin) -> io::Result<File> {
    use std::os::fd::AsRawFd;

    let fd = stdin.into_owned_fd()?;
    let raw = fd.as_raw_fd();
    // SAFETY: raw stays a valid descriptor while `fd` is alive
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above
    if unsafe { libc::fcntl(raw, libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(File::from(fd))
}

#[cfg(not(unix))]
fn blocking_stdin(_stdin: tokio::process::ChildStdin) -> io::Result<File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "encoder stdin relay needs a Unix host",
    ))
}

/// Run every pass `job` still needs, one after another, stopping at the
/// first pass that fails. Returns the job as the last pass left it.
pub async fn run_all_passes(
    orchestrator: &Orchestrator,
    events: &mut mpsc::UnboundedReceiver<EncodeEvent>,
    mut job: EncodeJob,
    mut on_progress: impl FnMut(&EncodeProgress),
) -> EncodeCompleted {
    loop {
        orchestrator.start(job.clone());

        let completed = loop {
            match events.recv().await {
                Some(EncodeEvent::Started) => info!("Pass {} of {} started", job.pass, job.total_passes),
                Some(EncodeEvent::Progress(progress)) => on_progress(&progress),
                Some(EncodeEvent::Completed(completed)) => break completed,
                None => {
                    return EncodeCompleted {
                        success: false,
                        error: Some("event channel closed".to_string()),
                        message: "event channel closed".to_string(),
                        job,
                    }
                }
            }
        };

        if !completed.success || !completed.job.encode_succeeded() || completed.job.is_final_pass() {
            return completed;
        }

        job = completed.job;
        job.pass += 1;
        job.completed = false;
        job.exit_code = None;
    }
}
