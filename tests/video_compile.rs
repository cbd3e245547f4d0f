//! Manual video compilation over real folders.

use std::path::Path;
use std::time::Duration;

use petriwatch::experiment::{frame_file_name, timelapse_root};
use petriwatch::video::{self, EncoderError, FfmpegEncoder, ScriptedEncoder, VideoError};
use tempfile::TempDir;

fn write_frames(folder: &Path, count: u32) {
    std::fs::create_dir_all(folder).unwrap();
    for i in 1..=count {
        std::fs::write(folder.join(frame_file_name(i)), format!("frame {}", i)).unwrap();
    }
}

fn file_count(folder: &Path) -> usize {
    std::fs::read_dir(folder).unwrap().count()
}

#[test]
fn test_ten_frames_give_one_video() {
    let dir = TempDir::new().unwrap();
    let folder = timelapse_root(dir.path()).join("growth");
    write_frames(&folder, 10);

    let mut encoder = ScriptedEncoder::new();
    let output = video::compile(&folder, Path::new("video.mp4"), 5, &mut encoder).unwrap();

    assert_eq!(output, folder.join("video.mp4"));
    assert!(output.is_file());
    assert_eq!(file_count(&folder), 11);

    let jobs = encoder.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].fps, 5);
    assert_eq!(jobs[0].frame_count, 10);
    assert_eq!(jobs[0].start_number, 1);
}

#[test]
fn test_source_frames_are_untouched() {
    let dir = TempDir::new().unwrap();
    write_frames(dir.path(), 3);

    let mut encoder = ScriptedEncoder::new();
    video::compile(dir.path(), Path::new("out.mp4"), 24, &mut encoder).unwrap();

    for i in 1..=3 {
        let content = std::fs::read_to_string(dir.path().join(frame_file_name(i))).unwrap();
        assert_eq!(content, format!("frame {}", i));
    }
}

#[test]
fn test_empty_folder_is_no_frames() {
    let dir = TempDir::new().unwrap();
    let mut encoder = ScriptedEncoder::new();

    let err = video::compile(dir.path(), Path::new("video.mp4"), 5, &mut encoder).unwrap_err();
    assert!(matches!(err, VideoError::NoFrames(_)));
    assert!(encoder.jobs().is_empty());
    assert!(!dir.path().join("video.mp4").exists());
}

#[test]
fn test_folder_without_frame_files_is_no_frames() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("settings.json"), b"{}").unwrap();
    std::fs::write(dir.path().join("image_1.png"), b"x").unwrap();

    let mut encoder = ScriptedEncoder::new();
    let err = video::compile(dir.path(), Path::new("video.mp4"), 5, &mut encoder).unwrap_err();
    assert!(matches!(err, VideoError::NoFrames(_)));
}

#[test]
fn test_missing_ffmpeg_is_encoder_not_found() {
    let dir = TempDir::new().unwrap();
    write_frames(dir.path(), 2);

    let mut encoder =
        FfmpegEncoder::new("petriwatch-no-such-ffmpeg", 23, Duration::from_secs(5));
    let err = video::compile(dir.path(), Path::new("video.mp4"), 5, &mut encoder).unwrap_err();
    assert!(matches!(err, VideoError::Encoder(EncoderError::NotFound { .. })));
    assert!(!dir.path().join("video.mp4").exists());
}

#[cfg(unix)]
#[test]
fn test_encoder_exit_status_is_reported() {
    let dir = TempDir::new().unwrap();
    write_frames(dir.path(), 2);

    // `false` ignores its arguments and exits 1.
    let mut encoder = FfmpegEncoder::new("false", 23, Duration::from_secs(5));
    let err = video::compile(dir.path(), Path::new("video.mp4"), 5, &mut encoder).unwrap_err();
    assert!(matches!(
        err,
        VideoError::Encoder(EncoderError::Failed { exit_code: Some(1), .. })
    ));
}
