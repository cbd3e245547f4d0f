//! Still-image capture boundary.
//!
//! The acquisition loop only talks to a [`StillCamera`]:
//! - [`CommandCamera`] runs the Raspberry Pi camera apps
//! - [`ScriptedCamera`] writes stub frames and fails on demand, for tests

mod command;
mod errors;
mod scripted;

use std::path::Path;

use crate::experiment::Resolution;

pub use command::{
    camera_command, is_raspberry_pi, CommandCamera, CommandCameraSettings, DEFAULT_CAPTURE_TIMEOUT,
};
pub use errors::CaptureError;
pub use scripted::ScriptedCamera;

/// Something that can take one still picture.
pub trait StillCamera: Send {
    /// Capture a single image at `resolution` into `output`.
    ///
    /// Blocks until the image is written or the attempt fails. Implementations
    /// must not run unbounded.
    fn capture(&mut self, resolution: Resolution, output: &Path) -> Result<(), CaptureError>;
}
