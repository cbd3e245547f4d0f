//! petriwatch library crate.
//!
//! Scheduled still capture for time-lapse experiments, plus compilation of
//! the captured frames into a video. The `petriwatch` binary is a thin CLI
//! over these modules.

pub mod acquisition;
pub mod capture;
pub mod config;
pub mod error;
pub mod experiment;
pub mod journal;
pub mod preview;
pub mod process;
pub mod schedule;
pub mod video;

pub use error::{AcquisitionError, ConfigurationError};
