//! Background worker management. At most one run is active at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::events::{EventSink, RunEvent};
use super::state::RunState;
use super::worker::{AcquisitionLoop, RunOutcome, RunRequest};
use crate::error::AcquisitionError;
use crate::schedule::CancelToken;

/// Clears the busy flag when the worker exits, including by panic.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Starts acquisition runs on a dedicated worker thread.
#[derive(Debug, Default)]
pub struct RunController {
    active: Arc<AtomicBool>,
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a run is currently active.
    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start `request` on a new worker.
    ///
    /// Rejects synchronously with [`AcquisitionError::Busy`] while another
    /// run is active, and with a configuration error for invalid parameters.
    pub fn start(
        &self,
        mut acquisition: AcquisitionLoop,
        request: RunRequest,
    ) -> Result<RunHandle, AcquisitionError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Rejected run '{}': another run is active", request.experiment_name);
            return Err(AcquisitionError::Busy);
        }
        let guard = ActiveGuard(self.active.clone());

        acquisition.validate(&request)?;

        let (sink, events) = EventSink::channel();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();

        let worker = thread::Builder::new()
            .name("petriwatch-acquisition".to_string())
            .spawn(move || {
                let _guard = guard;
                let mut state = RunState::default();
                acquisition.run(&request, &mut state, &worker_cancel, &sink)
            })
            .map_err(AcquisitionError::WorkerSpawn)?;

        Ok(RunHandle {
            events,
            cancel,
            worker,
        })
    }
}

/// Caller's side of an active run.
pub struct RunHandle {
    events: Receiver<RunEvent>,
    cancel: CancelToken,
    worker: JoinHandle<Result<RunOutcome, AcquisitionError>>,
}

impl RunHandle {
    /// Events from the worker. The channel disconnects when the run ends.
    pub fn events(&self) -> &Receiver<RunEvent> {
        &self.events
    }

    /// Request cancellation; honoured at the next tick boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the worker exits.
    pub fn wait(self) -> Result<RunOutcome, AcquisitionError> {
        self.worker
            .join()
            .map_err(|_| AcquisitionError::WorkerPanicked)?
    }
}
