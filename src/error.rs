//! Error taxonomy shared by the acquisition loop and the run controller.

use std::path::PathBuf;

use crate::capture::CaptureError;

/// Invalid run parameters, rejected before any work starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid interval {minutes} min (allowed: 1, 2, 5, 10, 15, 20, 30)")]
    InvalidInterval { minutes: u32 },

    #[error("invalid resolution '{value}' (allowed: 4056x3040, 2028x1520, 1014x760)")]
    InvalidResolution { value: String },

    #[error("number of photos must be greater than 0")]
    InvalidFrameCount,

    #[error("framerate must be between 1 and 120 fps, got {fps}")]
    InvalidFramerate { fps: u32 },

    #[error("'{}' already holds frames from an earlier run; choose another experiment name", folder.display())]
    ExperimentExists { folder: PathBuf },
}

/// Errors that can stop or reject an acquisition run.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("filesystem error at '{}': {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("capture of frame {index} failed twice: {source}")]
    CaptureFailure {
        index: u32,
        #[source]
        source: CaptureError,
    },

    #[error("an acquisition is already running")]
    Busy,

    #[error("failed to start acquisition worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("acquisition worker panicked")]
    WorkerPanicked,
}

impl AcquisitionError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AcquisitionError::Filesystem {
            path: path.into(),
            source,
        }
    }
}
