//! The acquisition loop: capture, store, report, sleep, repeat.

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::events::{EventSink, RunEvent};
use super::state::{RunState, RunStatus};
use crate::capture::{CaptureError, StillCamera};
use crate::error::{AcquisitionError, ConfigurationError};
use crate::experiment::{
    acquisition_root, frame_file_name, Experiment, Frame, Interval, Resolution, JOURNAL_FILE,
    MANIFEST_FILE,
};
use crate::journal::RunJournal;
use crate::schedule::{next_wait, CancelToken, Clock};
use crate::video::{self, VideoEncoder, DEFAULT_FPS, DEFAULT_VIDEO_FILENAME};

/// Parameters accepted when a run starts.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub experiment_name: String,
    pub interval_minutes: u32,
    pub resolution: Resolution,
    pub frame_count: u32,
    pub auto_video: bool,
    /// Frames go under `<pictures_dir>/PetriWatch/<experiment>`
    pub pictures_dir: PathBuf,
}

impl RunRequest {
    /// Check the parameters and resolve the experiment folder. A folder
    /// that already holds frames is refused so runs never mix.
    pub fn validate(&self) -> Result<Experiment, ConfigurationError> {
        let interval = Interval::from_minutes(self.interval_minutes)?;
        let experiment = Experiment::new(
            &self.experiment_name,
            interval,
            self.resolution,
            self.frame_count,
            &acquisition_root(&self.pictures_dir),
        )?;
        if experiment.has_frames() {
            return Err(ConfigurationError::ExperimentExists {
                folder: experiment.folder,
            });
        }
        Ok(experiment)
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        frames: u32,
        /// Set when auto-video was requested and the encode succeeded
        video: Option<PathBuf>,
    },
    Cancelled {
        frames: u32,
    },
    Failed {
        frames: u32,
        error: AcquisitionError,
    },
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Completed { .. } => RunStatus::Completed,
            RunOutcome::Cancelled { .. } => RunStatus::Cancelled,
            RunOutcome::Failed { .. } => RunStatus::Failed,
        }
    }

    /// Frames stored by the run.
    pub fn frames(&self) -> u32 {
        match self {
            RunOutcome::Completed { frames, .. }
            | RunOutcome::Cancelled { frames }
            | RunOutcome::Failed { frames, .. } => *frames,
        }
    }
}

/// Drives one camera and one encoder through a run.
pub struct AcquisitionLoop {
    camera: Box<dyn StillCamera>,
    encoder: Box<dyn VideoEncoder>,
    clock: Arc<dyn Clock>,
    video_fps: u32,
    video_filename: PathBuf,
}

impl AcquisitionLoop {
    pub fn new(
        camera: impl StillCamera + 'static,
        encoder: impl VideoEncoder + 'static,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            camera: Box::new(camera),
            encoder: Box::new(encoder),
            clock,
            video_fps: DEFAULT_FPS,
            video_filename: PathBuf::from(DEFAULT_VIDEO_FILENAME),
        }
    }

    /// Framerate and file name used for auto-video.
    pub fn with_video(mut self, fps: u32, filename: impl Into<PathBuf>) -> Self {
        self.video_fps = fps;
        self.video_filename = filename.into();
        self
    }

    /// Validate `request` against this loop, including the auto-video
    /// framerate.
    pub fn validate(&self, request: &RunRequest) -> Result<Experiment, ConfigurationError> {
        let experiment = request.validate()?;
        if request.auto_video {
            video::check_framerate(self.video_fps)?;
        }
        Ok(experiment)
    }

    /// Execute a run to its end.
    ///
    /// Invalid parameters are returned as `Err` before anything touches the
    /// filesystem. Everything after that ends in a [`RunOutcome`], which is
    /// also announced once on `events` as a terminal `StateChanged`.
    pub fn run(
        &mut self,
        request: &RunRequest,
        state: &mut RunState,
        cancel: &CancelToken,
        events: &EventSink,
    ) -> Result<RunOutcome, AcquisitionError> {
        let experiment = self.validate(request)?;
        let total = experiment.frame_count;

        state.reset(total);
        events.emit(RunEvent::StateChanged(RunStatus::Running));
        log::info!(
            "Starting '{}': {} photos every {} at {} into {}",
            experiment.name,
            total,
            experiment.interval,
            experiment.resolution,
            experiment.folder.display()
        );

        if let Err(e) = experiment.create_folder() {
            let error = AcquisitionError::filesystem(&experiment.folder, e);
            return Ok(finish(state, events, None, RunOutcome::Failed { frames: 0, error }));
        }
        if let Err(e) = experiment.write_manifest() {
            let error = AcquisitionError::filesystem(experiment.folder.join(MANIFEST_FILE), e);
            return Ok(finish(state, events, None, RunOutcome::Failed { frames: 0, error }));
        }

        let mut journal = RunJournal::open(&experiment.folder.join(JOURNAL_FILE));
        journal.started(total);

        let interval = experiment.interval.duration();
        for index in 1..=total {
            if cancel.is_cancelled() {
                log::info!("Acquisition cancelled before frame {}", index);
                let outcome = RunOutcome::Cancelled {
                    frames: state.current(),
                };
                return Ok(finish(state, events, Some(&mut journal), outcome));
            }

            let tick_started = self.clock.now();
            match self.capture_frame(&experiment, index, &mut journal, events) {
                Ok(frame) => {
                    state.record_frame(index);
                    events.emit(RunEvent::FrameCaptured(frame));
                    events.emit(RunEvent::Progress(state.snapshot()));
                }
                Err(error) => {
                    let outcome = RunOutcome::Failed {
                        frames: state.current(),
                        error,
                    };
                    return Ok(finish(state, events, Some(&mut journal), outcome));
                }
            }

            if index < total {
                let elapsed = self.clock.now().saturating_sub(tick_started);
                let wait = next_wait(interval, elapsed);
                log::debug!("Frame {} took {:?}, next in {:?}", index, elapsed, wait);
                events.emit(RunEvent::Waiting {
                    next_index: index + 1,
                    wait,
                });
                self.clock.sleep(wait, cancel);
            }
        }

        let video = if request.auto_video {
            self.compile_video(&experiment.folder, events)
        } else {
            None
        };
        let outcome = RunOutcome::Completed {
            frames: state.current(),
            video,
        };
        Ok(finish(state, events, Some(&mut journal), outcome))
    }

    /// Capture frame `index`, retrying once on failure.
    fn capture_frame(
        &mut self,
        experiment: &Experiment,
        index: u32,
        journal: &mut RunJournal,
        events: &EventSink,
    ) -> Result<Frame, AcquisitionError> {
        let file_name = frame_file_name(index);
        let pending = experiment.pending_path(index);
        let started = self.clock.now();

        let first = match self.attempt(experiment.resolution, &pending) {
            Ok(()) => return self.store(experiment, index, &pending, started, journal),
            Err(e) => e,
        };
        log::warn!("Capture of {} failed, retrying: {}", file_name, first);
        journal.capture_error(&file_name, 1, &first.to_string());
        events.emit(RunEvent::Retrying {
            index,
            reason: first.to_string(),
        });

        match self.attempt(experiment.resolution, &pending) {
            Ok(()) => self.store(experiment, index, &pending, started, journal),
            Err(second) => {
                log::error!("Capture of {} failed again: {}", file_name, second);
                journal.capture_error(&file_name, 2, &second.to_string());
                Err(AcquisitionError::CaptureFailure {
                    index,
                    source: second,
                })
            }
        }
    }

    /// One camera call, verifying a non-empty file was written.
    fn attempt(&mut self, resolution: Resolution, pending: &Path) -> Result<(), CaptureError> {
        let result = self
            .camera
            .capture(resolution, pending)
            .and_then(|()| match std::fs::metadata(pending) {
                Ok(meta) if meta.len() == 0 => Err(CaptureError::EmptyOutput(pending.to_path_buf())),
                Ok(_) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(CaptureError::MissingOutput(pending.to_path_buf()))
                }
                Err(e) => Err(CaptureError::Io(e)),
            });
        if result.is_err() {
            let _ = std::fs::remove_file(pending);
        }
        result
    }

    fn store(
        &self,
        experiment: &Experiment,
        index: u32,
        pending: &Path,
        started: Duration,
        journal: &mut RunJournal,
    ) -> Result<Frame, AcquisitionError> {
        let path = experiment.frame_path(index);
        std::fs::rename(pending, &path).map_err(|e| AcquisitionError::filesystem(&path, e))?;

        let file_name = frame_file_name(index);
        let elapsed = self.clock.now().saturating_sub(started);
        let captured_at = Local::now();
        log::info!(
            "Captured {} ({}/{}, {:.2}s)",
            file_name,
            index,
            experiment.frame_count,
            elapsed.as_secs_f64()
        );
        journal.captured(&file_name, elapsed);
        Ok(Frame {
            index,
            path,
            captured_at,
        })
    }

    fn compile_video(&mut self, folder: &Path, events: &EventSink) -> Option<PathBuf> {
        match video::compile(folder, &self.video_filename, self.video_fps, self.encoder.as_mut()) {
            Ok(path) => Some(path),
            Err(e) => {
                log::error!("Video compilation failed: {}", e);
                events.emit(RunEvent::Error(format!("video compilation failed: {}", e)));
                None
            }
        }
    }
}

/// Record the terminal status and announce it exactly once.
fn finish(
    state: &mut RunState,
    events: &EventSink,
    journal: Option<&mut RunJournal>,
    outcome: RunOutcome,
) -> RunOutcome {
    let status = outcome.status();
    state.finish(status);

    if let RunOutcome::Failed { error, .. } = &outcome {
        log::error!("Acquisition failed: {}", error);
        events.emit(RunEvent::Error(error.to_string()));
    } else {
        log::info!("Acquisition {} with {} frame(s)", status, outcome.frames());
    }
    if let Some(journal) = journal {
        journal.finished(&format!("{} ({} frames)", status, outcome.frames()));
    }
    events.emit(RunEvent::StateChanged(status));
    outcome
}
