//! Live camera preview via `rpicam-hello` / `libcamera-hello`.

use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use crate::capture::{camera_command, CaptureError};
use crate::process::interrupt_and_wait;

/// Grace period before a preview that ignores SIGINT is killed.
const STOP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct PreviewSettings {
    /// Explicit program; discovered when `None`
    pub program: Option<PathBuf>,
    pub hflip: bool,
    pub vflip: bool,
}

/// Arguments for an endless preview window.
pub fn preview_args(hflip: bool, vflip: bool) -> Vec<&'static str> {
    let mut args = vec!["-t", "0"];
    if hflip {
        args.push("--hflip");
    }
    if vflip {
        args.push("--vflip");
    }
    args
}

/// A running preview process. Stopped on drop.
pub struct Preview {
    child: Child,
}

impl Preview {
    pub fn start(settings: &PreviewSettings) -> Result<Self, CaptureError> {
        let program = match &settings.program {
            Some(p) => p.clone(),
            None => camera_command("hello")?,
        };
        let child = Command::new(&program)
            .args(preview_args(settings.hflip, settings.vflip))
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CaptureError::ProgramNotFound {
                        program: program.display().to_string(),
                    }
                } else {
                    CaptureError::Io(e)
                }
            })?;
        log::info!("Preview started ({})", program.display());
        Ok(Self { child })
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Stop the preview gracefully.
    pub fn stop(&mut self) -> std::io::Result<ExitStatus> {
        let status = interrupt_and_wait(&mut self.child, STOP_GRACE)?;
        log::info!("Preview closed");
        Ok(status)
    }
}

impl Drop for Preview {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
