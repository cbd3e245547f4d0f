//! Error types for still capture.

use std::path::PathBuf;
use std::time::Duration;

use crate::process::ProcessError;

/// Errors from a single capture attempt
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Neither the rpicam nor the libcamera variant is installed
    #[error(
        "No camera command found for '{base}'.\n\nInstall the camera apps with:\n\n    sudo apt install -y rpicam-apps\n"
    )]
    CommandNotFound { base: String },

    /// Configured program could not be found
    #[error("camera program '{program}' not found on PATH")]
    ProgramNotFound { program: String },

    /// Capture program exited with non-zero status
    #[error("capture command exited with code {exit_code:?}: {stderr}")]
    Failed { exit_code: Option<i32>, stderr: String },

    /// Capture program overran its timeout and was killed
    #[error("capture command timed out after {0:?}")]
    TimedOut(Duration),

    /// Program exited cleanly but the expected file is absent
    #[error("capture produced no file at '{}'", .0.display())]
    MissingOutput(PathBuf),

    /// Program wrote a zero-byte file
    #[error("capture produced an empty file at '{}'", .0.display())]
    EmptyOutput(PathBuf),

    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessError> for CaptureError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::NotFound { program } => CaptureError::ProgramNotFound { program },
            ProcessError::TimedOut { timeout, .. } => CaptureError::TimedOut(timeout),
            ProcessError::SpawnFailed { source, .. } | ProcessError::Io { source, .. } => {
                CaptureError::Io(source)
            }
        }
    }
}
