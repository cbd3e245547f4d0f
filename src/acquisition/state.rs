//! Run state owned by the acquisition worker.

use std::fmt;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Cancelled | RunStatus::Failed
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Immutable copy of the run state handed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSnapshot {
    pub current: u32,
    pub total: u32,
    pub status: RunStatus,
}

impl RunSnapshot {
    /// Progress in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.current) / f64::from(self.total)
        }
    }
}

/// Mutable progress record. Only the worker holds a `&mut` to it.
#[derive(Debug, Default)]
pub struct RunState {
    current: u32,
    target: u32,
    status: RunStatus,
}

impl RunState {
    /// Start a new run towards `target` frames.
    pub fn reset(&mut self, target: u32) {
        self.current = 0;
        self.target = target;
        self.status = RunStatus::Running;
    }

    pub fn record_frame(&mut self, index: u32) {
        debug_assert_eq!(index, self.current + 1, "frames must be contiguous");
        self.current = index;
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            current: self.current,
            total: self.target,
            status: self.status,
        }
    }
}
