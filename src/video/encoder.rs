//! Encoder boundary: ffmpeg for real runs, a scripted double for tests.

use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::errors::EncoderError;

/// Default bound on one encode.
pub const DEFAULT_ENCODE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Default x264 constant rate factor.
pub const DEFAULT_CRF: u8 = 23;

/// One encode of a numbered frame sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeJob {
    /// printf-style input pattern, e.g. `/x/frame_%05d.png`
    pub input_pattern: PathBuf,
    /// Index of the first frame in the sequence
    pub start_number: u32,
    /// Number of frames found in the folder
    pub frame_count: usize,
    pub fps: u32,
    pub output: PathBuf,
}

/// Something that turns a frame sequence into a video file.
pub trait VideoEncoder: Send {
    fn encode(&mut self, job: &EncodeJob) -> Result<(), EncoderError>;
}

/// H.264/MP4 encoder backed by the `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
    crf: u8,
    timeout: Duration,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            crf: DEFAULT_CRF,
            timeout: DEFAULT_ENCODE_TIMEOUT,
        }
    }
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<String>, crf: u8, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            crf,
            timeout,
        }
    }

    /// ffmpeg arguments for `job`, excluding the program itself.
    pub fn args(&self, job: &EncodeJob) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-framerate".to_string(),
            job.fps.to_string(),
            "-start_number".to_string(),
            job.start_number.to_string(),
            "-i".to_string(),
            job.input_pattern.display().to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            job.output.display().to_string(),
        ]
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&mut self, job: &EncodeJob) -> Result<(), EncoderError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(job));

        log::info!(
            "Encoding {} frames at {} fps into {}",
            job.frame_count,
            job.fps,
            job.output.display()
        );
        let result = crate::process::run_with_timeout(&mut cmd, self.timeout)?;
        if !result.success() {
            return Err(EncoderError::Failed {
                exit_code: result.status.code(),
                stderr: result.stderr_tail(10),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct EncoderScript {
    fail: bool,
    skip_output: bool,
    jobs: Vec<EncodeJob>,
}

/// Test double for [`VideoEncoder`]. Writes a placeholder output file and
/// records every job; clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEncoder {
    script: Arc<Mutex<EncoderScript>>,
}

impl ScriptedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every encode exits non-zero.
    pub fn failing() -> Self {
        let encoder = Self::default();
        encoder.lock().fail = true;
        encoder
    }

    /// Every encode "succeeds" without writing output.
    pub fn silent() -> Self {
        let encoder = Self::default();
        encoder.lock().skip_output = true;
        encoder
    }

    pub fn jobs(&self) -> Vec<EncodeJob> {
        self.lock().jobs.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EncoderScript> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VideoEncoder for ScriptedEncoder {
    fn encode(&mut self, job: &EncodeJob) -> Result<(), EncoderError> {
        let mut script = self.lock();
        script.jobs.push(job.clone());
        if script.fail {
            return Err(EncoderError::Failed {
                exit_code: Some(1),
                stderr: "scripted encoder failure".to_string(),
            });
        }
        if !script.skip_output {
            std::fs::write(&job.output, b"\x00\x00\x00\x18ftypmp42")?;
        }
        Ok(())
    }
}
