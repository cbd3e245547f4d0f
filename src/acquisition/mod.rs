//! Time-lapse acquisition.
//!
//! - [`AcquisitionLoop`] runs one experiment synchronously
//! - [`RunController`] runs it on a background worker and rejects overlap
//! - [`RunEvent`]s flow one way from the worker to whoever presents them

mod controller;
mod events;
mod state;
mod worker;

pub use controller::{RunController, RunHandle};
pub use events::{EventSink, RunEvent};
pub use state::{RunSnapshot, RunState, RunStatus};
pub use worker::{AcquisitionLoop, RunOutcome, RunRequest};
