//! External process management for petriwatch.
//!
//! Capture and encode commands are run synchronously on the acquisition
//! worker, always with a bounded timeout. A command that overruns its
//! timeout is killed.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long stderr may stay open after the child exits. A grandchild that
/// inherited the pipe can hold it open indefinitely.
const STDERR_DRAIN: Duration = Duration::from_secs(1);

/// Errors that can occur while running an external command
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Program not found on PATH
    #[error("'{program}' not found on PATH")]
    NotFound { program: String },

    /// Failed to spawn the process
    #[error("failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Process did not exit within its timeout and was killed
    #[error("'{program}' timed out after {timeout:?} and was killed")]
    TimedOut { program: String, timeout: Duration },

    /// I/O error while waiting on the process
    #[error("I/O error while waiting for '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a command that ran to completion.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    /// Lines written to stderr
    pub stderr: Vec<String>,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last few stderr lines joined, for error messages.
    pub fn stderr_tail(&self, lines: usize) -> String {
        let start = self.stderr.len().saturating_sub(lines);
        self.stderr[start..].join("\n")
    }
}

/// Run `cmd` to completion, killing it if it runs longer than `timeout`.
///
/// stdin and stdout are discarded; stderr is collected line by line on a
/// helper thread so a chatty process can never block on a full pipe.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<ProcessOutput, ProcessError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    log::debug!("Running {:?} (timeout {:?})", cmd, timeout);

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProcessError::NotFound {
                program: program.clone(),
            }
        } else {
            ProcessError::SpawnFailed {
                program: program.clone(),
                source: e,
            }
        }
    })?;

    let stderr_reader = StderrReader::spawn(&mut child, &program);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stderr = stderr_reader.finish(STDERR_DRAIN);
                return Ok(ProcessOutput {
                    status,
                    stderr,
                    elapsed: started.elapsed(),
                });
            }
            Ok(None) => {
                if started.elapsed() >= timeout {
                    log::warn!("'{}' exceeded {:?}, killing it", program, timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    // The stderr thread is left detached: a grandchild may
                    // still hold the pipe open.
                    return Err(ProcessError::TimedOut { program, timeout });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(ProcessError::Io { program, source: e });
            }
        }
    }
}

/// Collects stderr lines on a helper thread into a shared buffer.
struct StderrReader {
    lines: Arc<Mutex<Vec<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl StderrReader {
    fn spawn(child: &mut Child, program: &str) -> Self {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let handle = child.stderr.take().map(|stderr| {
            let tag = program.to_string();
            let sink = lines.clone();
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    let Ok(line) = line else { break };
                    log::trace!("[{}] {}", tag, line);
                    sink.lock().unwrap_or_else(PoisonError::into_inner).push(line);
                }
            })
        });
        Self { lines, handle }
    }

    /// Wait up to `drain` for end of stream, then return what was read.
    /// A reader still blocked after that is left detached.
    fn finish(self, drain: Duration) -> Vec<String> {
        if let Some(handle) = self.handle {
            let started = Instant::now();
            while !handle.is_finished() && started.elapsed() < drain {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::debug!("stderr still open after exit, not waiting for it");
            }
        }
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.clone()
    }
}

/// Ask a long-running child to exit, escalating to a kill after `grace`.
///
/// On unix this sends SIGINT first, which lets camera preview programs
/// release the sensor cleanly.
pub fn interrupt_and_wait(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    #[cfg(unix)]
    {
        // SAFETY: plain signal delivery to a pid we own.
        unsafe {
            libc::kill(child.id() as i32, libc::SIGINT);
        }
    }

    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }

    let start = Instant::now();
    loop {
        match child.try_wait()? {
            Some(status) => return Ok(status),
            None => {
                if start.elapsed() > grace {
                    let _ = child.kill();
                    return child.wait();
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}
