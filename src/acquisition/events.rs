//! One-directional event channel from the worker to the presentation layer.

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use super::state::{RunSnapshot, RunStatus};
use crate::experiment::Frame;

/// Notification emitted by the acquisition worker.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Run entered a new status. Terminal statuses are sent exactly once.
    StateChanged(RunStatus),
    /// Sent after every stored frame.
    Progress(RunSnapshot),
    FrameCaptured(Frame),
    /// First capture attempt for `index` failed; it is tried once more.
    Retrying { index: u32, reason: String },
    /// Worker is sleeping until the next tick.
    Waiting { next_index: u32, wait: Duration },
    Error(String),
}

/// Sending half of the event channel.
///
/// Sends never block, and a dropped receiver is ignored: the run carries
/// on without an audience.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<RunEvent>>,
}

impl EventSink {
    pub fn new(tx: Sender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    pub fn discard() -> Self {
        Self::default()
    }

    /// A connected sink and its receiver.
    pub fn channel() -> (Self, Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
