// End-to-end passes with shell scripts standing in for the decoder and encoders
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use vconv_engine::config::{AppConfig, Priority};
use vconv_engine::decode::{DecodeRequest, DecoderFactory, ProcessSpec};
use vconv_engine::encode::Dialect;
use vconv_engine::jobs::create_job;
use vconv_engine::probe::{FormatInfo, MediaProbe, ProbeFuture, ProbeResult, VideoStream};
use vconv_engine::profile::{EncodingProfile, RateControl};
use vconv_engine::stream::StreamGeometry;
use vconv_engine::{run_all_passes, EncodeCompleted, EncodeEvent, EncodeJob, Orchestrator};

const Y4M: &str = "YUV4MPEG2 W2 H2 F25:1 Ip A1:1 C420\nFRAME\nabcdef";

const X264_OK: &str = r#"echo "$@" >> invocations.log
out=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "--output" ]; then out="$arg"; fi
    prev="$arg"
done
cat > "$out"
echo "[50.0%] 1/2 frames, 10.00 fps, 100.00 kb/s, eta 0:00:01" >&2
echo "[100.0%] 2/2 frames, 10.00 fps, 100.00 kb/s, eta 0:00:00" >&2
"#;

const FFMPEG_OK: &str = r#"echo "$@" >> invocations.log
in=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "-i" ]; then in="$arg"; fi
    prev="$arg"
    out="$arg"
done
cat "$in" > "$out"
echo "frame=    2 fps= 10 q=28.0 size=       1kB time=00:00:00.08 bitrate= 100.0kbits/s" >&2
"#;

/// Tool directories, each holding one flavour of fake encoder. Written once
/// before any test spawns a process.
struct FakeTools {
    _root: TempDir,
    ok: PathBuf,
    failing: PathBuf,
    hanging: PathBuf,
}

static TOOLS: LazyLock<FakeTools> = LazyLock::new(|| {
    let root = TempDir::new().unwrap();
    let ok = root.path().join("ok");
    let failing = root.path().join("failing");
    let hanging = root.path().join("hanging");

    write_script(&ok, "x264", X264_OK);
    write_script(&ok, "ffmpeg", FFMPEG_OK);
    write_script(&failing, "x264", &format!("{}exit 3\n", X264_OK));
    write_script(&hanging, "x264", "echo run >> runs.log\nexec sleep 30\n");

    FakeTools {
        _root: root,
        ok,
        failing,
        hanging,
    }
});

fn write_script(dir: &Path, name: &str, body: &str) {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Runs a shell script as the decoder, with the decode pipe as `$0`.
struct ShellDecoder {
    script: String,
}

impl ShellDecoder {
    /// Writes a tiny y4m stream into the decode pipe.
    fn writing_stream() -> Self {
        Self::running(&format!("printf '{}' > \"$0\"", Y4M.replace('\n', "\\n")))
    }

    fn running(script: &str) -> Self {
        Self {
            script: script.to_string(),
        }
    }
}

impl DecoderFactory for ShellDecoder {
    fn decode_process(&self, request: &DecodeRequest) -> ProcessSpec {
        ProcessSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec![
                "-c".to_string(),
                self.script.clone(),
                request.pipe.to_string_lossy().into_owned(),
            ],
        }
    }
}

/// Reports a 1280x720 stream for whatever it is asked about.
struct FixedProbe;

impl MediaProbe for FixedProbe {
    fn probe<'a>(&'a self, _path: &'a Path) -> ProbeFuture<'a> {
        Box::pin(async {
            Ok(ProbeResult {
                format: FormatInfo {
                    duration: Some(0.08),
                    size: 6,
                    bitrate: None,
                },
                video_streams: vec![VideoStream {
                    index: 0,
                    codec_name: "h264".to_string(),
                    width: 1280,
                    height: 720,
                    bitrate: None,
                    frame_rate: Some("25/1".to_string()),
                    frame_count: Some(2),
                    display_aspect: Some("16:9".to_string()),
                    is_default: true,
                }],
            })
        })
    }
}

struct Harness {
    work: TempDir,
    orchestrator: Orchestrator,
    events: mpsc::UnboundedReceiver<EncodeEvent>,
}

impl Harness {
    fn new(tools: &Path) -> Self {
        Self::with_decoder(tools, ShellDecoder::writing_stream())
    }

    fn with_decoder(tools: &Path, decoder: ShellDecoder) -> Self {
        let work = TempDir::new().unwrap();
        let config = AppConfig {
            tools_path: tools.to_path_buf(),
            work_dir: work.path().join("work"),
            pipe_dir: work.path().to_path_buf(),
            process_priority: Priority::Normal,
            thread_priority: Priority::Normal,
            job_state_dir: work.path().join("jobs"),
            ..Default::default()
        };
        let (tx, events) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::with_collaborators(
            Arc::new(config),
            Arc::new(decoder),
            Arc::new(FixedProbe),
            tx,
        );
        Self {
            work,
            orchestrator,
            events,
        }
    }

    fn work_dir(&self) -> PathBuf {
        self.work.path().join("work")
    }

    fn job(&self, rate_control: RateControl, dialect: Dialect) -> EncodeJob {
        let profile = EncodingProfile {
            rate_control,
            vbr_bitrate: 1000,
            ..Default::default()
        };
        let geometry = StreamGeometry {
            width: 2,
            height: 2,
            aspect_ratio: 1.0,
            frame_count: 2,
            ..Default::default()
        };
        let mut job = create_job(
            profile,
            geometry,
            self.work.path().join("source.avs"),
            self.work.path().join("out.264"),
        );
        job.dialect = dialect;
        job
    }

    async fn run(&mut self, job: EncodeJob) -> (EncodeCompleted, Vec<f64>) {
        let mut percents = Vec::new();
        let completed = tokio::time::timeout(
            Duration::from_secs(30),
            run_all_passes(&self.orchestrator, &mut self.events, job, |progress| {
                percents.push(progress.percent)
            }),
        )
        .await
        .expect("encode finished in time");
        (completed, percents)
    }

    async fn next_completed(&mut self) -> EncodeCompleted {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(30), self.events.recv())
                .await
                .expect("event in time")
                .expect("channel open");
            if let EncodeEvent::Completed(completed) = event {
                return completed;
            }
        }
    }

    fn invocations(&self, name: &str) -> Vec<String> {
        std::fs::read_to_string(self.work_dir().join(name))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

#[tokio::test]
async fn test_single_pass_relays_stream_to_encoder() {
    let mut harness = Harness::new(&TOOLS.ok);
    let job = harness.job(RateControl::Crf, Dialect::Native);
    let output = job.output_path.clone();

    let (completed, percents) = harness.run(job).await;

    assert!(completed.success);
    assert_eq!(completed.job.exit_code, Some(0));
    assert!(completed.job.completed);
    assert!(completed.job.output_produced);
    assert_eq!(completed.job.stream_file.as_deref(), Some(output.as_path()));
    assert_eq!(std::fs::read_to_string(&output).unwrap(), Y4M);
    assert_eq!(percents, vec![50.0, 100.0]);

    // Re-probed geometry replaces the one the job started with
    assert_eq!(
        (completed.job.geometry.width, completed.job.geometry.height),
        (1280, 720)
    );
    assert!(completed
        .job
        .temp_files
        .contains(&harness.work_dir().join("x264_2pass.log")));
    assert!(!harness.orchestrator.is_encoding());
}

#[tokio::test]
async fn test_two_pass_job_runs_both_passes() {
    let mut harness = Harness::new(&TOOLS.ok);
    let job = harness.job(RateControl::TwoPass, Dialect::Native);
    assert_eq!(job.total_passes, 2);
    let output = job.output_path.clone();

    let (completed, _) = harness.run(job).await;

    assert!(completed.success);
    assert_eq!(completed.job.pass, 2);
    assert_eq!(completed.job.exit_code, Some(0));
    assert_eq!(std::fs::read_to_string(&output).unwrap(), Y4M);

    let runs = harness.invocations("invocations.log");
    assert_eq!(runs.len(), 2);
    assert!(runs[0].contains("--pass 1"));
    assert!(runs[0].contains("--output /dev/null"));
    assert!(runs[1].contains("--pass 2"));
    assert!(runs[1].contains(&output.to_string_lossy().into_owned()));
}

#[tokio::test]
async fn test_embedded_dialect_reads_encode_pipe() {
    let mut harness = Harness::new(&TOOLS.ok);
    let job = harness.job(RateControl::Crf, Dialect::Embedded);
    let output = job.output_path.clone();

    let (completed, percents) = harness.run(job).await;

    assert!(completed.success);
    assert_eq!(completed.job.exit_code, Some(0));
    assert_eq!(std::fs::read_to_string(&output).unwrap(), Y4M);
    assert_eq!(percents, vec![100.0]);

    let runs = harness.invocations("invocations.log");
    assert_eq!(runs.len(), 1);
    assert!(runs[0].contains("-c:v libx264"));

    // ffmpeg names its first-pass statistics differently from x264
    let temp_files = &completed.job.temp_files;
    assert!(temp_files.contains(&harness.work_dir().join("ffmpeg2pass-0.log")));
    assert!(temp_files.contains(&harness.work_dir().join("ffmpeg2pass-0.log.mbtree")));
    assert!(!temp_files.contains(&harness.work_dir().join("x264_2pass.log")));
}

#[tokio::test]
async fn test_encoder_failure_still_completes() {
    let mut harness = Harness::new(&TOOLS.failing);
    let job = harness.job(RateControl::TwoPass, Dialect::Native);

    let (completed, _) = harness.run(job).await;

    // The orchestration ran; the encode itself did not work
    assert!(completed.success);
    assert_eq!(completed.job.exit_code, Some(3));
    assert_eq!(completed.job.pass, 1);
    assert!(!completed.job.output_produced);
    assert_eq!(harness.invocations("invocations.log").len(), 1);
}

#[tokio::test]
async fn test_missing_encoder_reports_start_failure() {
    let missing = TOOLS.ok.join("does-not-exist");
    let mut harness = Harness::new(&missing);
    let job = harness.job(RateControl::Crf, Dialect::Native);

    let (completed, _) = harness.run(job).await;

    assert!(!completed.success);
    assert!(completed.error.is_some());
    assert_eq!(completed.job.exit_code, Some(-1));
    assert!(!harness.orchestrator.is_encoding());
}

#[tokio::test]
async fn test_second_start_rejected_and_stop_kills_encoder() {
    let mut harness = Harness::new(&TOOLS.hanging);
    let job = harness.job(RateControl::Crf, Dialect::Native);

    harness.orchestrator.start(job.clone());
    harness.orchestrator.start(job);
    assert!(harness.orchestrator.is_encoding());

    let rejected = harness.next_completed().await;
    assert!(!rejected.success);
    assert_eq!(rejected.job.exit_code, Some(-1));
    assert!(harness.orchestrator.is_encoding());

    // Wait until the first encoder is really running
    let runs = harness.work_dir().join("runs.log");
    tokio::time::timeout(Duration::from_secs(10), async {
        while !runs.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("encoder started");

    harness.orchestrator.stop();
    harness.orchestrator.stop();

    let stopped = harness.next_completed().await;
    assert!(stopped.success);
    assert_eq!(stopped.job.exit_code, Some(-1));
    assert!(!harness.orchestrator.is_encoding());
    assert_eq!(harness.invocations("runs.log").len(), 1);
}

#[tokio::test]
async fn test_decoder_failure_before_connecting_fails_job() {
    for dialect in [Dialect::Native, Dialect::Embedded] {
        let mut harness = Harness::with_decoder(&TOOLS.ok, ShellDecoder::running("exit 1"));
        let job = harness.job(RateControl::TwoPass, dialect);

        let (completed, _) = harness.run(job).await;

        assert!(!completed.success, "{:?}", dialect);
        assert!(completed.error.as_deref().unwrap_or_default().contains("decoder"));
        assert_eq!(completed.job.exit_code, Some(-1));
        assert_eq!(completed.job.pass, 1);
        assert!(!completed.job.output_produced);
        assert!(!harness.orchestrator.is_encoding());
    }
}

#[tokio::test]
async fn test_decoder_failure_after_partial_stream_fails_job() {
    let script = "printf 'YUV4MPEG2 ' > \"$0\"; exit 2";
    let mut harness = Harness::with_decoder(&TOOLS.ok, ShellDecoder::running(script));
    let job = harness.job(RateControl::Crf, Dialect::Native);

    let (completed, _) = harness.run(job).await;

    assert!(!completed.success);
    assert!(completed.error.is_some());
    assert_ne!(completed.job.exit_code, Some(0));
    assert!(!harness.orchestrator.is_encoding());
}

#[tokio::test]
async fn test_decoder_exit_without_connecting_ends_encoder_input() {
    for dialect in [Dialect::Native, Dialect::Embedded] {
        let mut harness = Harness::with_decoder(&TOOLS.ok, ShellDecoder::running("exit 0"));
        let job = harness.job(RateControl::Crf, dialect);
        let output = job.output_path.clone();

        let (completed, _) = harness.run(job).await;

        // The encoder saw an empty stream and finished on its own
        assert!(completed.success, "{:?}", dialect);
        assert_eq!(completed.job.exit_code, Some(0));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "");
        assert!(!harness.orchestrator.is_encoding());
    }
}

#[test]
fn test_start_outside_runtime_reports_failure() {
    let mut harness = Harness::new(&TOOLS.ok);
    let job = harness.job(RateControl::Crf, Dialect::Native);

    harness.orchestrator.start(job);

    match harness.events.try_recv() {
        Ok(EncodeEvent::Completed(completed)) => {
            assert!(!completed.success);
            assert!(completed.error.is_some());
            assert_eq!(completed.job.exit_code, Some(-1));
        }
        other => panic!("expected a failed completion, got {:?}", other),
    }
    assert!(!harness.orchestrator.is_encoding());
    assert!(harness.events.try_recv().is_err());
}
