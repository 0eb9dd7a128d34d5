use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::encode::Dialect;
use crate::profile::EncodingProfile;
use crate::stream::{CropRect, StreamGeometry};

/// Exit code recorded when the job failed before the encoder ran.
pub const START_FAILED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeJob {
    // Identity
    pub id: String,
    pub profile: EncodingProfile,
    pub geometry: StreamGeometry,
    #[serde(default)]
    pub crop: CropRect,
    #[serde(default)]
    pub dialect: Dialect,

    // Paths
    /// What the decoder reads: a source file or a generated script.
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Current intermediate file of the video stream; replaced by the output
    /// once the final pass succeeds.
    pub stream_file: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    pub index_file: Option<PathBuf>,
    pub stereo_config: Option<PathBuf>,

    // Rate control
    /// Requested bitrate in kbit/s; 0 uses the profile's own.
    pub target_bitrate: u32,
    pub pass: u8,
    pub total_passes: u8,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    // Runtime state
    pub exit_code: Option<i32>,
    pub completed: bool,
    pub output_produced: bool,
    pub elapsed: Duration,
    pub remaining: Duration,
    pub temp_files: Vec<PathBuf>,
}

pub fn create_job(
    profile: EncodingProfile,
    geometry: StreamGeometry,
    input_path: PathBuf,
    output_path: PathBuf,
) -> EncodeJob {
    let total_passes = profile.rate_control.required_passes();
    EncodeJob {
        id: Uuid::new_v4().to_string(),
        profile,
        geometry,
        crop: CropRect::default(),
        dialect: Dialect::default(),
        input_path,
        output_path,
        stream_file: None,
        script_path: None,
        index_file: None,
        stereo_config: None,
        target_bitrate: 0,
        pass: 1,
        total_passes,
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
        exit_code: None,
        completed: false,
        output_produced: false,
        elapsed: Duration::ZERO,
        remaining: Duration::ZERO,
        temp_files: Vec::new(),
    }
}

impl EncodeJob {
    /// Pass 2 of 2, pass 3 of 3, or the only pass.
    pub fn is_final_pass(&self) -> bool {
        self.pass >= self.total_passes
    }

    pub fn register_temp_file(&mut self, path: PathBuf) {
        if !self.temp_files.contains(&path) {
            self.temp_files.push(path);
        }
    }

    /// Whether the encoder itself reported success.
    pub fn encode_succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.pass == 0 || self.pass > self.total_passes {
            return Err(format!(
                "pass {} is outside 1..={}",
                self.pass, self.total_passes
            ));
        }
        if self.geometry.width == 0 || self.geometry.height == 0 {
            return Err("stream geometry has no resolution".to_string());
        }
        if self.geometry.fps_num == 0 || self.geometry.fps_den == 0 {
            return Err("stream geometry has no frame rate".to_string());
        }
        Ok(())
    }
}

pub fn save_job(job: &EncodeJob, state_dir: &Path) -> Result<()> {
    use std::fs;
    use std::io::Write;

    fs::create_dir_all(state_dir)?;

    let json = serde_json::to_string_pretty(job)?;

    // Write atomically using a temporary file
    let job_file = state_dir.join(format!("{}.json", job.id));
    let temp_file = state_dir.join(format!("{}.json.tmp", job.id));

    let mut file = fs::File::create(&temp_file)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_file, &job_file)?;

    Ok(())
}

pub fn load_job(path: &Path) -> Result<EncodeJob> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {:?}", path))?;
    serde_json::from_str::<EncodeJob>(&contents)
        .with_context(|| format!("Failed to parse job file {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::RateControl;
    use tempfile::TempDir;

    fn job(rate_control: RateControl) -> EncodeJob {
        let profile = EncodingProfile {
            rate_control,
            ..Default::default()
        };
        create_job(
            profile,
            StreamGeometry::default(),
            PathBuf::from("/in/movie.avs"),
            PathBuf::from("/out/movie.264"),
        )
    }

    #[test]
    fn test_total_passes_follow_rate_control() {
        assert_eq!(job(RateControl::Crf).total_passes, 1);
        assert_eq!(job(RateControl::TwoPass).total_passes, 2);
        assert_eq!(job(RateControl::ThreePass).total_passes, 3);
    }

    #[test]
    fn test_final_pass() {
        let mut job = job(RateControl::ThreePass);
        assert!(!job.is_final_pass());
        job.pass = 2;
        assert!(!job.is_final_pass());
        job.pass = 3;
        assert!(job.is_final_pass());
    }

    #[test]
    fn test_validate() {
        let mut job = job(RateControl::TwoPass);
        assert!(job.validate().is_ok());
        job.pass = 3;
        assert!(job.validate().is_err());
        job.pass = 1;
        job.geometry.fps_den = 0;
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_temp_files_registered_once() {
        let mut job = job(RateControl::Crf);
        job.register_temp_file(PathBuf::from("/work/x264_2pass.log"));
        job.register_temp_file(PathBuf::from("/work/x264_2pass.log"));
        assert_eq!(job.temp_files.len(), 1);
    }

    #[test]
    fn test_save_and_load_job() {
        let dir = TempDir::new().unwrap();
        let mut job = job(RateControl::TwoPass);
        job.exit_code = Some(0);
        job.elapsed = Duration::from_millis(1500);

        save_job(&job, dir.path()).unwrap();

        let path = dir.path().join(format!("{}.json", job.id));
        assert!(path.exists());
        assert!(!dir.path().join(format!("{}.json.tmp", job.id)).exists());
        assert_eq!(load_job(&path).unwrap(), job);
    }

    #[test]
    fn test_load_job_reports_bad_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_job(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse job file"));
    }
}
