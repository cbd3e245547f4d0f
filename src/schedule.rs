//! Tick scheduling: clocks, cancellation and inter-tick wait computation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Longest single sleep slice; cancellation is noticed at least this often.
const SLEEP_SLICE: Duration = Duration::from_millis(500);

/// Time left before the next tick.
///
/// The capture time is subtracted from the interval and floored at zero, so
/// a slow capture never turns into a negative sleep and never carries debt
/// into later ticks.
pub fn next_wait(interval: Duration, elapsed_capture: Duration) -> Duration {
    interval.saturating_sub(elapsed_capture)
}

/// Advisory cancellation flag shared between the worker and its observer.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Monotonic time source used by the acquisition loop.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Sleep for `duration`, returning early if `cancel` is set.
    fn sleep(&self, duration: Duration, cancel: &CancelToken);
}

/// Wall-clock implementation backed by [`Instant`].
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        let deadline = Instant::now() + duration;
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    sleeps: Vec<Duration>,
}

/// Simulated clock. Time only moves when [`ManualClock::advance`] or
/// [`Clock::sleep`] is called; every requested sleep is recorded.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward, e.g. to simulate a slow capture.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.now += by;
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sleeps
            .clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).now
    }

    fn sleep(&self, duration: Duration, _cancel: &CancelToken) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sleeps.push(duration);
        state.now += duration;
    }
}
