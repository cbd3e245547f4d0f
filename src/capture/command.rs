//! Still capture through the Raspberry Pi camera apps.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::errors::CaptureError;
use super::StillCamera;
use crate::experiment::Resolution;
use crate::process;

/// Default bound on a single capture; the camera apps need a few seconds
/// for exposure settling.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolve the installed camera app for `base` ("still", "hello", ...).
///
/// Newer Raspberry Pi OS ships `rpicam-*`; older releases ship `libcamera-*`.
pub fn camera_command(base: &str) -> Result<PathBuf, CaptureError> {
    for candidate in [format!("rpicam-{}", base), format!("libcamera-{}", base)] {
        if let Ok(path) = which::which(&candidate) {
            log::debug!("Using camera command {}", path.display());
            return Ok(path);
        }
    }
    Err(CaptureError::CommandNotFound {
        base: base.to_string(),
    })
}

/// Whether we are running on a Raspberry Pi.
pub fn is_raspberry_pi() -> bool {
    std::fs::read_to_string("/proc/device-tree/model")
        .map(|model| model.contains("Raspberry Pi"))
        .unwrap_or(false)
}

/// Settings for the external still-capture program.
#[derive(Debug, Clone)]
pub struct CommandCameraSettings {
    /// Explicit program; discovered with [`camera_command`] when `None`
    pub program: Option<PathBuf>,
    pub hflip: bool,
    pub vflip: bool,
    pub timeout: Duration,
}

impl Default for CommandCameraSettings {
    fn default() -> Self {
        Self {
            program: None,
            hflip: true,
            vflip: true,
            timeout: DEFAULT_CAPTURE_TIMEOUT,
        }
    }
}

/// Camera backed by `rpicam-still` / `libcamera-still`.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    program: PathBuf,
    hflip: bool,
    vflip: bool,
    timeout: Duration,
}

impl CommandCamera {
    /// Create a camera, discovering the program if none is configured.
    pub fn new(settings: CommandCameraSettings) -> Result<Self, CaptureError> {
        let program = match settings.program {
            Some(program) => program,
            None => camera_command("still")?,
        };
        Ok(Self {
            program,
            hflip: settings.hflip,
            vflip: settings.vflip,
            timeout: settings.timeout,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for one capture, excluding the program itself.
    pub fn args(&self, resolution: Resolution, output: &Path) -> Vec<String> {
        let (width, height) = resolution.dimensions();
        let mut args = vec![
            "-o".to_string(),
            output.display().to_string(),
            "-n".to_string(),
            "--encoding".to_string(),
            "png".to_string(),
            "--width".to_string(),
            width.to_string(),
            "--height".to_string(),
            height.to_string(),
        ];
        if self.hflip {
            args.push("--hflip".to_string());
        }
        if self.vflip {
            args.push("--vflip".to_string());
        }
        args
    }
}

impl StillCamera for CommandCamera {
    fn capture(&mut self, resolution: Resolution, output: &Path) -> Result<(), CaptureError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(resolution, output));

        let result = process::run_with_timeout(&mut cmd, self.timeout)?;
        if !result.success() {
            return Err(CaptureError::Failed {
                exit_code: result.status.code(),
                stderr: result.stderr_tail(5),
            });
        }
        log::debug!(
            "{} finished in {:.2}s",
            self.program.display(),
            result.elapsed.as_secs_f64()
        );
        Ok(())
    }
}
