//! Time-lapse video compilation from a folder of numbered frames.

mod encoder;
mod errors;

use std::path::{Path, PathBuf};

use crate::error::ConfigurationError;
use crate::experiment::{parse_frame_index, FRAME_PATTERN};

pub use encoder::{
    EncodeJob, FfmpegEncoder, ScriptedEncoder, VideoEncoder, DEFAULT_CRF, DEFAULT_ENCODE_TIMEOUT,
};
pub use errors::{EncoderError, VideoError};

/// Default output file name.
pub const DEFAULT_VIDEO_FILENAME: &str = "video.mp4";
/// Framerate used when the acquisition loop compiles automatically.
pub const DEFAULT_FPS: u32 = 24;
/// Highest accepted framerate.
pub const MAX_FPS: u32 = 120;

/// Accept framerates in `1..=MAX_FPS`.
pub fn check_framerate(fps: u32) -> Result<(), ConfigurationError> {
    if (1..=MAX_FPS).contains(&fps) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidFramerate { fps })
    }
}

/// Numbered frames found in a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSequence {
    pub folder: PathBuf,
    /// Sorted frame indices
    pub indices: Vec<u32>,
}

impl FrameSequence {
    /// List the `frame_NNNNN.png` files in `folder`.
    pub fn scan(folder: &Path) -> Result<Self, VideoError> {
        let entries = std::fs::read_dir(folder).map_err(|e| VideoError::Folder {
            path: folder.to_path_buf(),
            source: e,
        })?;

        let mut indices: Vec<u32> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| parse_frame_index(&entry.file_name().to_string_lossy()))
            .collect();
        indices.sort_unstable();

        Ok(Self {
            folder: folder.to_path_buf(),
            indices,
        })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn first(&self) -> Option<u32> {
        self.indices.first().copied()
    }

    /// Indices missing between the first and last frame.
    pub fn gaps(&self) -> Vec<u32> {
        self.indices
            .windows(2)
            .flat_map(|w| (w[0] + 1)..w[1])
            .collect()
    }
}

/// Compile the numbered frames in `folder` into `output_filename` at `fps`.
///
/// A relative `output_filename` is placed inside `folder`. Source frames
/// are never modified. Returns the path of the written video.
pub fn compile(
    folder: &Path,
    output_filename: &Path,
    fps: u32,
    encoder: &mut dyn VideoEncoder,
) -> Result<PathBuf, VideoError> {
    check_framerate(fps)?;

    let frames = FrameSequence::scan(folder)?;
    let Some(start_number) = frames.first() else {
        return Err(VideoError::NoFrames(folder.to_path_buf()));
    };

    let gaps = frames.gaps();
    if !gaps.is_empty() {
        // The image2 demuxer stops at the first missing index.
        log::warn!(
            "{} frame(s) missing in {}, first gap at {}; the video ends there",
            gaps.len(),
            folder.display(),
            gaps[0]
        );
    }

    let output = if output_filename.is_absolute() {
        output_filename.to_path_buf()
    } else {
        folder.join(output_filename)
    };

    let job = EncodeJob {
        input_pattern: folder.join(FRAME_PATTERN),
        start_number,
        frame_count: frames.len(),
        fps,
        output: output.clone(),
    };
    encoder.encode(&job)?;

    if !output.is_file() {
        return Err(EncoderError::MissingOutput(output).into());
    }
    log::info!("Wrote {}", output.display());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::frame_file_name;
    use tempfile::TempDir;

    fn write_frames(dir: &Path, indices: &[u32]) {
        for &i in indices {
            std::fs::write(dir.join(frame_file_name(i)), b"png").unwrap();
        }
    }

    #[test]
    fn test_scan_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), &[3, 1, 2]);
        std::fs::write(dir.path().join("settings.json"), b"{}").unwrap();
        std::fs::write(dir.path().join(".frame_00004.pending.png"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("frame_00009.png")).unwrap();

        let seq = FrameSequence::scan(dir.path()).unwrap();
        assert_eq!(seq.indices, vec![1, 2, 3]);
        assert_eq!(seq.first(), Some(1));
        assert!(seq.gaps().is_empty());
    }

    #[test]
    fn test_gaps() {
        let seq = FrameSequence {
            folder: PathBuf::from("/x"),
            indices: vec![1, 2, 5, 7],
        };
        assert_eq!(seq.gaps(), vec![3, 4, 6]);
    }

    #[test]
    fn test_check_framerate_bounds() {
        assert!(check_framerate(1).is_ok());
        assert!(check_framerate(MAX_FPS).is_ok());
        assert_eq!(check_framerate(0), Err(ConfigurationError::InvalidFramerate { fps: 0 }));
        assert_eq!(check_framerate(121), Err(ConfigurationError::InvalidFramerate { fps: 121 }));
    }

    #[test]
    fn test_compile_rejects_bad_framerate() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), &[1]);
        let mut encoder = ScriptedEncoder::new();
        let err = compile(dir.path(), Path::new("video.mp4"), 0, &mut encoder).unwrap_err();
        assert!(matches!(
            err,
            VideoError::Configuration(ConfigurationError::InvalidFramerate { fps: 0 })
        ));
        assert!(encoder.jobs().is_empty());
    }

    #[test]
    fn test_compile_missing_folder() {
        let dir = TempDir::new().unwrap();
        let mut encoder = ScriptedEncoder::new();
        let err = compile(&dir.path().join("nope"), Path::new("video.mp4"), 5, &mut encoder).unwrap_err();
        assert!(matches!(err, VideoError::Folder { .. }));
    }

    #[test]
    fn test_compile_starts_at_lowest_index() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), &[4, 5, 6]);
        let mut encoder = ScriptedEncoder::new();
        compile(dir.path(), Path::new("video.mp4"), 10, &mut encoder).unwrap();
        let jobs = encoder.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].start_number, 4);
        assert_eq!(jobs[0].frame_count, 3);
        assert_eq!(jobs[0].input_pattern, dir.path().join("frame_%05d.png"));
    }

    #[test]
    fn test_compile_absolute_output() {
        let frames = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_frames(frames.path(), &[1, 2]);
        let target = out.path().join("movie.mp4");
        let mut encoder = ScriptedEncoder::new();
        let written = compile(frames.path(), &target, 24, &mut encoder).unwrap();
        assert_eq!(written, target);
        assert!(target.exists());
    }

    #[test]
    fn test_compile_missing_output_is_encoder_error() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), &[1]);
        let mut encoder = ScriptedEncoder::silent();
        let err = compile(dir.path(), Path::new("video.mp4"), 24, &mut encoder).unwrap_err();
        assert!(matches!(err, VideoError::Encoder(EncoderError::MissingOutput(_))));
    }
}
