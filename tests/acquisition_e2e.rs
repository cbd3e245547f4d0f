//! End-to-end tests for the acquisition loop and run controller.
//!
//! Cameras, encoders and clocks are scripted so these run without a camera,
//! ffmpeg, or real minutes passing.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use petriwatch::acquisition::{
    AcquisitionLoop, EventSink, RunController, RunEvent, RunOutcome, RunRequest, RunState,
    RunStatus,
};
use petriwatch::capture::{CaptureError, ScriptedCamera, StillCamera};
use petriwatch::experiment::{frame_file_name, Resolution};
use petriwatch::schedule::{CancelToken, Clock, ManualClock};
use petriwatch::video::ScriptedEncoder;
use petriwatch::{AcquisitionError, ConfigurationError};
use tempfile::TempDir;

fn request(dir: &Path, name: &str, frames: u32) -> RunRequest {
    RunRequest {
        experiment_name: name.to_string(),
        interval_minutes: 1,
        resolution: Resolution::Half,
        frame_count: frames,
        auto_video: false,
        pictures_dir: dir.to_path_buf(),
    }
}

fn experiment_dir(dir: &Path, name: &str) -> PathBuf {
    dir.join("PetriWatch").join(name)
}

/// Sorted file names in `folder` that start with "frame_".
fn frame_files(folder: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(folder)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("frame_") || n.contains(".pending"))
        .collect();
    names.sort();
    names
}

fn expected_frames(count: u32) -> Vec<String> {
    (1..=count).map(frame_file_name).collect()
}

/// Run synchronously and collect every event.
fn run_collecting(
    acquisition: &mut AcquisitionLoop,
    request: &RunRequest,
    cancel: &CancelToken,
) -> (RunOutcome, Vec<RunEvent>) {
    let (sink, rx) = EventSink::channel();
    let mut state = RunState::default();
    let outcome = acquisition
        .run(request, &mut state, cancel, &sink)
        .expect("request is valid");
    drop(sink);
    (outcome, rx.iter().collect())
}

fn terminal_states(events: &[RunEvent]) -> Vec<RunStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::StateChanged(s) if s.is_terminal() => Some(*s),
            _ => None,
        })
        .collect()
}

/// Cancels `token` once `after` captures have been made.
struct CancellingCamera {
    inner: ScriptedCamera,
    token: CancelToken,
    after: u32,
}

impl StillCamera for CancellingCamera {
    fn capture(&mut self, resolution: Resolution, output: &Path) -> Result<(), CaptureError> {
        let result = self.inner.capture(resolution, output);
        if self.inner.calls() >= self.after {
            self.token.cancel();
        }
        result
    }
}

/// Blocks every capture until the test releases it.
struct GatedCamera {
    inner: ScriptedCamera,
    entered: Sender<()>,
    gate: Receiver<()>,
}

impl StillCamera for GatedCamera {
    fn capture(&mut self, resolution: Resolution, output: &Path) -> Result<(), CaptureError> {
        let _ = self.entered.send(());
        let _ = self.gate.recv();
        self.inner.capture(resolution, output)
    }
}

#[test]
fn test_completed_run_has_every_frame_without_gaps() {
    let dir = TempDir::new().unwrap();
    let camera = ScriptedCamera::new();
    let mut acq = AcquisitionLoop::new(camera.clone(), ScriptedEncoder::new(), Arc::new(ManualClock::new()));

    for frames in [1, 5, 12] {
        let name = format!("run{}", frames);
        let (outcome, events) = run_collecting(&mut acq, &request(dir.path(), &name, frames), &CancelToken::new());

        assert!(matches!(outcome, RunOutcome::Completed { frames: f, video: None } if f == frames));
        assert_eq!(frame_files(&experiment_dir(dir.path(), &name)), expected_frames(frames));
        assert_eq!(terminal_states(&events), vec![RunStatus::Completed]);
        assert_eq!(events.first(), Some(&RunEvent::StateChanged(RunStatus::Running)));
        assert_eq!(events.last(), Some(&RunEvent::StateChanged(RunStatus::Completed)));

        let progress: Vec<(u32, u32)> = events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Progress(s) => Some((s.current, s.total)),
                _ => None,
            })
            .collect();
        let expected: Vec<(u32, u32)> = (1..=frames).map(|i| (i, frames)).collect();
        assert_eq!(progress, expected);
    }
}

#[test]
fn test_frame_events_carry_final_paths() {
    let dir = TempDir::new().unwrap();
    let mut acq = AcquisitionLoop::new(ScriptedCamera::new(), ScriptedEncoder::new(), Arc::new(ManualClock::new()));
    let (_, events) = run_collecting(&mut acq, &request(dir.path(), "paths", 3), &CancelToken::new());

    let frames: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::FrameCaptured(f) => Some(f.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(frames.len(), 3);
    for (i, frame) in frames.iter().enumerate() {
        let index = i as u32 + 1;
        assert_eq!(frame.index, index);
        assert_eq!(frame.path, experiment_dir(dir.path(), "paths").join(frame_file_name(index)));
        assert!(frame.path.is_file());
    }
}

#[test]
fn test_cancel_at_tick_k_keeps_exactly_k_frames() {
    let frame_count = 6;
    for k in 1..frame_count {
        let dir = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        let camera = CancellingCamera {
            inner: ScriptedCamera::new(),
            token: cancel.clone(),
            after: k,
        };
        let mut acq = AcquisitionLoop::new(camera, ScriptedEncoder::new(), Arc::new(ManualClock::new()));
        let (outcome, events) = run_collecting(&mut acq, &request(dir.path(), "cancel", frame_count), &cancel);

        assert!(
            matches!(outcome, RunOutcome::Cancelled { frames } if frames == k),
            "k={} outcome={:?}",
            k,
            outcome
        );
        assert_eq!(frame_files(&experiment_dir(dir.path(), "cancel")), expected_frames(k));
        assert_eq!(terminal_states(&events), vec![RunStatus::Cancelled]);
    }
}

#[test]
fn test_cancel_before_start_captures_nothing() {
    let dir = TempDir::new().unwrap();
    let camera = ScriptedCamera::new();
    let mut acq = AcquisitionLoop::new(camera.clone(), ScriptedEncoder::new(), Arc::new(ManualClock::new()));
    let cancel = CancelToken::new();
    cancel.cancel();

    let (outcome, _) = run_collecting(&mut acq, &request(dir.path(), "early", 3), &cancel);
    assert!(matches!(outcome, RunOutcome::Cancelled { frames: 0 }));
    assert_eq!(camera.calls(), 0);
}

#[test]
fn test_two_consecutive_failures_fail_run_and_keep_earlier_frames() {
    let dir = TempDir::new().unwrap();
    // Calls 3 and 4 are the first and retried attempt for frame 3.
    let camera = ScriptedCamera::new().failing_on([3, 4]);
    let mut acq = AcquisitionLoop::new(camera.clone(), ScriptedEncoder::new(), Arc::new(ManualClock::new()));

    let (outcome, events) = run_collecting(&mut acq, &request(dir.path(), "fail", 5), &CancelToken::new());

    match outcome {
        RunOutcome::Failed { frames, error } => {
            assert_eq!(frames, 2);
            assert!(matches!(error, AcquisitionError::CaptureFailure { index: 3, .. }));
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(camera.calls(), 4);
    assert_eq!(frame_files(&experiment_dir(dir.path(), "fail")), expected_frames(2));
    assert_eq!(terminal_states(&events), vec![RunStatus::Failed]);
    assert!(events.iter().any(|e| matches!(e, RunEvent::Retrying { index: 3, .. })));
    assert!(events.iter().any(|e| matches!(e, RunEvent::Error(m) if m.contains("frame 3"))));
}

#[test]
fn test_single_failure_is_retried_without_gap() {
    let dir = TempDir::new().unwrap();
    let camera = ScriptedCamera::new().failing_on([2]);
    let mut acq = AcquisitionLoop::new(camera.clone(), ScriptedEncoder::new(), Arc::new(ManualClock::new()));

    let (outcome, events) = run_collecting(&mut acq, &request(dir.path(), "retry", 3), &CancelToken::new());

    assert!(matches!(outcome, RunOutcome::Completed { frames: 3, .. }));
    assert_eq!(camera.calls(), 4);
    assert_eq!(frame_files(&experiment_dir(dir.path(), "retry")), expected_frames(3));
    let retries: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, RunEvent::Retrying { .. }))
        .collect();
    assert_eq!(retries.len(), 1);
    assert!(!events.iter().any(|e| matches!(e, RunEvent::Error(_))));
}

#[test]
fn test_zero_byte_capture_counts_as_failure() {
    let dir = TempDir::new().unwrap();
    let camera = ScriptedCamera::new().empty_on([1, 2]);
    let mut acq = AcquisitionLoop::new(camera, ScriptedEncoder::new(), Arc::new(ManualClock::new()));

    let (outcome, _) = run_collecting(&mut acq, &request(dir.path(), "empty", 3), &CancelToken::new());
    match outcome {
        RunOutcome::Failed { frames, error } => {
            assert_eq!(frames, 0);
            assert!(matches!(
                error,
                AcquisitionError::CaptureFailure {
                    index: 1,
                    source: CaptureError::EmptyOutput(_)
                }
            ));
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert!(frame_files(&experiment_dir(dir.path(), "empty")).is_empty());
}

#[test]
fn test_zero_byte_then_good_capture_recovers() {
    let dir = TempDir::new().unwrap();
    let camera = ScriptedCamera::new().empty_on([1]);
    let mut acq = AcquisitionLoop::new(camera, ScriptedEncoder::new(), Arc::new(ManualClock::new()));

    let (outcome, _) = run_collecting(&mut acq, &request(dir.path(), "recover", 2), &CancelToken::new());
    assert!(matches!(outcome, RunOutcome::Completed { frames: 2, .. }));
    let first = experiment_dir(dir.path(), "recover").join("frame_00001.png");
    assert!(std::fs::metadata(first).unwrap().len() > 0);
}

#[test]
fn test_sleep_is_interval_minus_capture_time() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let camera = ScriptedCamera::new().with_capture_time(clock.clone(), Duration::from_secs(10));
    let mut acq = AcquisitionLoop::new(camera, ScriptedEncoder::new(), Arc::new(clock.clone()));

    let (_, events) = run_collecting(&mut acq, &request(dir.path(), "fast", 4), &CancelToken::new());

    assert_eq!(clock.sleeps(), vec![Duration::from_secs(50); 3]);
    let waits: Vec<(u32, Duration)> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Waiting { next_index, wait } => Some((*next_index, *wait)),
            _ => None,
        })
        .collect();
    assert_eq!(
        waits,
        vec![
            (2, Duration::from_secs(50)),
            (3, Duration::from_secs(50)),
            (4, Duration::from_secs(50))
        ]
    );
}

#[test]
fn test_slow_capture_proceeds_immediately_without_debt() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let camera = ScriptedCamera::new().with_capture_time(clock.clone(), Duration::from_secs(90));
    let mut acq = AcquisitionLoop::new(camera, ScriptedEncoder::new(), Arc::new(clock.clone()));

    run_collecting(&mut acq, &request(dir.path(), "slow", 4), &CancelToken::new());

    assert_eq!(clock.sleeps(), vec![Duration::ZERO; 3]);
    assert_eq!(clock.now(), Duration::from_secs(90 * 4));
}

#[test]
fn test_retry_time_counts_against_interval() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let camera = ScriptedCamera::new()
        .failing_on([1])
        .with_capture_time(clock.clone(), Duration::from_secs(20));
    let mut acq = AcquisitionLoop::new(camera, ScriptedEncoder::new(), Arc::new(clock.clone()));

    run_collecting(&mut acq, &request(dir.path(), "retrytime", 3), &CancelToken::new());

    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(20), Duration::from_secs(40)]
    );
}

#[test]
fn test_auto_video_compiles_experiment_folder() {
    let dir = TempDir::new().unwrap();
    let encoder = ScriptedEncoder::new();
    let mut acq = AcquisitionLoop::new(ScriptedCamera::new(), encoder.clone(), Arc::new(ManualClock::new()));
    let mut req = request(dir.path(), "video", 4);
    req.auto_video = true;

    let (outcome, _) = run_collecting(&mut acq, &req, &CancelToken::new());

    let folder = experiment_dir(dir.path(), "video");
    match outcome {
        RunOutcome::Completed { frames, video } => {
            assert_eq!(frames, 4);
            assert_eq!(video, Some(folder.join("video.mp4")));
        }
        other => panic!("expected Completed, got {:?}", other),
    }
    let jobs = encoder.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].fps, 24);
    assert_eq!(jobs[0].frame_count, 4);
    assert_eq!(jobs[0].start_number, 1);
}

#[test]
fn test_auto_video_failure_is_reported_but_run_completes() {
    let dir = TempDir::new().unwrap();
    let mut acq = AcquisitionLoop::new(ScriptedCamera::new(), ScriptedEncoder::failing(), Arc::new(ManualClock::new()))
        .with_video(5, "timelapse.mp4");
    let mut req = request(dir.path(), "badvideo", 2);
    req.auto_video = true;

    let (outcome, events) = run_collecting(&mut acq, &req, &CancelToken::new());

    assert!(matches!(outcome, RunOutcome::Completed { frames: 2, video: None }));
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::Error(m) if m.contains("video compilation failed"))));
    assert_eq!(terminal_states(&events), vec![RunStatus::Completed]);
}

#[test]
fn test_no_video_without_auto_video() {
    let dir = TempDir::new().unwrap();
    let encoder = ScriptedEncoder::new();
    let mut acq = AcquisitionLoop::new(ScriptedCamera::new(), encoder.clone(), Arc::new(ManualClock::new()));
    run_collecting(&mut acq, &request(dir.path(), "novideo", 2), &CancelToken::new());
    assert!(encoder.jobs().is_empty());
    assert!(!experiment_dir(dir.path(), "novideo").join("video.mp4").exists());
}

#[test]
fn test_second_run_while_active_is_busy() {
    let dir = TempDir::new().unwrap();
    let controller = RunController::new();

    let (entered_tx, entered_rx) = mpsc::channel();
    let (gate_tx, gate_rx) = mpsc::channel();
    let first_camera = ScriptedCamera::new();
    let gated = GatedCamera {
        inner: first_camera.clone(),
        entered: entered_tx,
        gate: gate_rx,
    };
    let first = controller
        .start(
            AcquisitionLoop::new(gated, ScriptedEncoder::new(), Arc::new(ManualClock::new())),
            request(dir.path(), "first", 2),
        )
        .unwrap();

    // Wait until the first run is inside its first capture.
    entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(controller.is_busy());

    let second_camera = ScriptedCamera::new();
    let second = controller.start(
        AcquisitionLoop::new(second_camera.clone(), ScriptedEncoder::new(), Arc::new(ManualClock::new())),
        request(dir.path(), "second", 3),
    );
    assert!(matches!(second, Err(AcquisitionError::Busy)));
    assert_eq!(second_camera.calls(), 0);
    assert!(!experiment_dir(dir.path(), "second").exists());

    gate_tx.send(()).unwrap();
    gate_tx.send(()).unwrap();

    let events: Vec<RunEvent> = first.events().iter().collect();
    let outcome = first.wait().unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { frames: 2, .. }));
    assert_eq!(first_camera.calls(), 2);
    assert_eq!(terminal_states(&events), vec![RunStatus::Completed]);
    assert_eq!(frame_files(&experiment_dir(dir.path(), "first")), expected_frames(2));
    assert!(!controller.is_busy());
}

#[test]
fn test_controller_cancel_stops_at_tick_boundary() {
    let dir = TempDir::new().unwrap();
    let controller = RunController::new();

    let (entered_tx, entered_rx) = mpsc::channel();
    let (gate_tx, gate_rx) = mpsc::channel();
    let gated = GatedCamera {
        inner: ScriptedCamera::new(),
        entered: entered_tx,
        gate: gate_rx,
    };
    let handle = controller
        .start(
            AcquisitionLoop::new(gated, ScriptedEncoder::new(), Arc::new(ManualClock::new())),
            request(dir.path(), "stop", 10),
        )
        .unwrap();

    entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    // Cancelled mid-capture: the capture in progress still completes.
    handle.cancel();
    gate_tx.send(()).unwrap();

    let outcome = handle.wait().unwrap();
    assert!(matches!(outcome, RunOutcome::Cancelled { frames: 1 }));
    assert_eq!(frame_files(&experiment_dir(dir.path(), "stop")), expected_frames(1));
}

#[test]
fn test_reused_experiment_name_is_rejected_before_capture() {
    let dir = TempDir::new().unwrap();
    let camera = ScriptedCamera::new();
    let encoder = ScriptedEncoder::new();
    let mut acq = AcquisitionLoop::new(camera.clone(), encoder.clone(), Arc::new(ManualClock::new()));
    let folder = experiment_dir(dir.path(), "plate");

    let (first, _) = run_collecting(&mut acq, &request(dir.path(), "plate", 4), &CancelToken::new());
    assert!(matches!(first, RunOutcome::Completed { frames: 4, .. }));
    let before: Vec<Vec<u8>> = expected_frames(4)
        .iter()
        .map(|name| std::fs::read(folder.join(name)).unwrap())
        .collect();

    let mut again = request(dir.path(), "plate", 2);
    again.auto_video = true;
    let (sink, rx) = EventSink::channel();
    let err = acq
        .run(&again, &mut RunState::default(), &CancelToken::new(), &sink)
        .unwrap_err();
    drop(sink);

    assert!(matches!(
        err,
        AcquisitionError::Configuration(ConfigurationError::ExperimentExists { folder: ref f }) if *f == folder
    ));
    assert_eq!(rx.iter().count(), 0);
    assert_eq!(camera.calls(), 4);
    assert!(encoder.jobs().is_empty());
    assert_eq!(frame_files(&folder), expected_frames(4));
    for (name, bytes) in expected_frames(4).iter().zip(&before) {
        assert_eq!(&std::fs::read(folder.join(name)).unwrap(), bytes);
    }

    // Same name padded differently resolves to the same folder.
    let controller = RunController::new();
    let started = controller.start(
        AcquisitionLoop::new(ScriptedCamera::new(), ScriptedEncoder::new(), Arc::new(ManualClock::new())),
        request(dir.path(), "  plate ", 1),
    );
    assert!(matches!(
        started,
        Err(AcquisitionError::Configuration(ConfigurationError::ExperimentExists { .. }))
    ));
    assert!(!controller.is_busy());
}

#[test]
fn test_folder_without_frames_can_be_reused() {
    let dir = TempDir::new().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut acq = AcquisitionLoop::new(ScriptedCamera::new(), ScriptedEncoder::new(), Arc::new(ManualClock::new()));

    // Cancelled before the first photo: folder and manifest exist, no frames.
    let (outcome, _) = run_collecting(&mut acq, &request(dir.path(), "retake", 3), &cancel);
    assert!(matches!(outcome, RunOutcome::Cancelled { frames: 0 }));
    assert!(experiment_dir(dir.path(), "retake").join("settings.json").is_file());

    let (outcome, _) = run_collecting(&mut acq, &request(dir.path(), "retake", 3), &CancelToken::new());
    assert!(matches!(outcome, RunOutcome::Completed { frames: 3, .. }));
    assert_eq!(frame_files(&experiment_dir(dir.path(), "retake")), expected_frames(3));
}

#[test]
fn test_dot_names_stay_inside_acquisition_root() {
    let dir = TempDir::new().unwrap();
    let mut acq = AcquisitionLoop::new(ScriptedCamera::new(), ScriptedEncoder::new(), Arc::new(ManualClock::new()));

    let (outcome, _) = run_collecting(&mut acq, &request(dir.path(), "..", 2), &CancelToken::new());
    assert!(matches!(outcome, RunOutcome::Completed { frames: 2, .. }));
    assert_eq!(frame_files(&experiment_dir(dir.path(), "experiment")), expected_frames(2));
    assert!(!dir.path().join("settings.json").exists());
    assert!(!dir.path().join("frame_00001.png").exists());
    assert!(!dir.path().join("PetriWatch").join("frame_00001.png").exists());
}

#[test]
fn test_bad_auto_video_framerate_is_rejected_before_capture() {
    for fps in [0, 500] {
        let dir = TempDir::new().unwrap();
        let camera = ScriptedCamera::new();
        let mut acq = AcquisitionLoop::new(camera.clone(), ScriptedEncoder::new(), Arc::new(ManualClock::new()))
            .with_video(fps, "video.mp4");
        let mut req = request(dir.path(), "fps", 5);
        req.auto_video = true;

        let err = acq
            .run(&req, &mut RunState::default(), &CancelToken::new(), &EventSink::discard())
            .unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::Configuration(ConfigurationError::InvalidFramerate { fps: f }) if f == fps
        ));
        assert_eq!(camera.calls(), 0);
        assert!(!dir.path().join("PetriWatch").exists());

        let controller = RunController::new();
        let started = controller.start(acq, req);
        assert!(matches!(
            started,
            Err(AcquisitionError::Configuration(ConfigurationError::InvalidFramerate { .. }))
        ));
        assert!(!controller.is_busy());
    }
}

#[test]
fn test_video_framerate_ignored_without_auto_video() {
    let dir = TempDir::new().unwrap();
    let mut acq = AcquisitionLoop::new(ScriptedCamera::new(), ScriptedEncoder::new(), Arc::new(ManualClock::new()))
        .with_video(0, "video.mp4");
    let (outcome, _) = run_collecting(&mut acq, &request(dir.path(), "nofps", 2), &CancelToken::new());
    assert!(matches!(outcome, RunOutcome::Completed { frames: 2, video: None }));
}
