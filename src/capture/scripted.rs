//! Scripted camera for running the acquisition loop without hardware.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::errors::CaptureError;
use super::StillCamera;
use crate::experiment::Resolution;
use crate::schedule::ManualClock;

/// Minimal PNG payload: signature plus an empty IHDR-sized tail.
const STUB_PNG: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
];

#[derive(Debug, Default)]
struct Script {
    calls: u32,
    failing_calls: BTreeSet<u32>,
    empty_calls: BTreeSet<u32>,
    capture_time: Duration,
    clock: Option<ManualClock>,
    resolutions: Vec<Resolution>,
}

/// Test double for [`StillCamera`].
///
/// Calls are numbered from 1 across the camera's lifetime (a retry is a new
/// call). Clones share the same script, so a test can keep one clone to
/// inspect after handing another to the acquisition loop.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCamera {
    script: Arc<Mutex<Script>>,
}

impl ScriptedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the given call numbers with a non-zero exit.
    pub fn failing_on(self, calls: impl IntoIterator<Item = u32>) -> Self {
        self.lock().failing_calls.extend(calls);
        self
    }

    /// Write a zero-byte file on the given call numbers.
    pub fn empty_on(self, calls: impl IntoIterator<Item = u32>) -> Self {
        self.lock().empty_calls.extend(calls);
        self
    }

    /// Advance `clock` by `capture_time` on every call.
    pub fn with_capture_time(self, clock: ManualClock, capture_time: Duration) -> Self {
        {
            let mut script = self.lock();
            script.clock = Some(clock);
            script.capture_time = capture_time;
        }
        self
    }

    /// Number of capture calls made so far.
    pub fn calls(&self) -> u32 {
        self.lock().calls
    }

    /// Resolution passed to each call.
    pub fn resolutions(&self) -> Vec<Resolution> {
        self.lock().resolutions.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StillCamera for ScriptedCamera {
    fn capture(&mut self, resolution: Resolution, output: &Path) -> Result<(), CaptureError> {
        let mut script = self.lock();
        script.calls += 1;
        script.resolutions.push(resolution);
        let call = script.calls;

        if let Some(clock) = &script.clock {
            clock.advance(script.capture_time);
        }

        if script.failing_calls.contains(&call) {
            return Err(CaptureError::Failed {
                exit_code: Some(1),
                stderr: format!("scripted failure on call {}", call),
            });
        }

        let payload: &[u8] = if script.empty_calls.contains(&call) {
            &[]
        } else {
            STUB_PNG
        };
        std::fs::write(output, payload)?;
        Ok(())
    }
}
