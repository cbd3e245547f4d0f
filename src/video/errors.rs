//! Error types for video compilation.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigurationError;
use crate::process::ProcessError;

/// Errors from the external encoder
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// Encoder executable not found
    #[error("'{program}' not found. Please install it with:\n\n    sudo apt install -y ffmpeg\n")]
    NotFound { program: String },

    /// Encoder exited with non-zero status
    #[error("encoder exited with code {exit_code:?}\n{stderr}")]
    Failed { exit_code: Option<i32>, stderr: String },

    /// Encoder overran its timeout and was killed
    #[error("encoder timed out after {0:?}")]
    TimedOut(Duration),

    /// Encoder reported success without writing the output
    #[error("encoder produced no output at '{}'", .0.display())]
    MissingOutput(PathBuf),

    #[error("encoder I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessError> for EncoderError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::NotFound { program } => EncoderError::NotFound { program },
            ProcessError::TimedOut { timeout, .. } => EncoderError::TimedOut(timeout),
            ProcessError::SpawnFailed { source, .. } | ProcessError::Io { source, .. } => {
                EncoderError::Io(source)
            }
        }
    }
}

/// Errors from [`compile`](super::compile)
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("no frame_NNNNN.png files found in '{}'", .0.display())]
    NoFrames(PathBuf),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("cannot read frame folder '{}': {source}", path.display())]
    Folder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Encoder(#[from] EncoderError),
}
