//! Experiment definition and on-disk layout.
//!
//! Frames for an experiment live in
//! `<pictures>/PetriWatch/<experiment>/frame_00001.png`, `frame_00002.png`, ...
//! next to a `settings.json` manifest and a `run.log` journal.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigurationError;

/// Folder under the pictures directory that holds acquisitions.
pub const ACQUISITION_DIR: &str = "PetriWatch";
/// Folder under the pictures directory used as the manual compilation root.
pub const TIMELAPSE_DIR: &str = "Timelapses";
/// Manifest file written at run start.
pub const MANIFEST_FILE: &str = "settings.json";
/// Run journal file.
pub const JOURNAL_FILE: &str = "run.log";
/// Input pattern for encoders, matching [`frame_file_name`].
pub const FRAME_PATTERN: &str = "frame_%05d.png";

const FRAME_PREFIX: &str = "frame_";
const FRAME_SUFFIX: &str = ".png";
const FRAME_DIGITS: usize = 5;
const MAX_NAME_LEN: usize = 80;
const DEFAULT_EXPERIMENT_NAME: &str = "experiment";

/// File name of the frame with the given 1-based index.
pub fn frame_file_name(index: u32) -> String {
    format!("{FRAME_PREFIX}{index:0width$}{FRAME_SUFFIX}", width = FRAME_DIGITS)
}

/// Hidden file the camera writes to before it is renamed into place.
pub fn pending_file_name(index: u32) -> String {
    format!(".{FRAME_PREFIX}{index:0width$}.pending{FRAME_SUFFIX}", width = FRAME_DIGITS)
}

/// Parse the index out of a frame file name, if it is one.
pub fn parse_frame_index(file_name: &str) -> Option<u32> {
    let digits = file_name
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(FRAME_SUFFIX)?;
    if digits.len() < FRAME_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `<pictures>/PetriWatch`
pub fn acquisition_root(pictures_dir: &Path) -> PathBuf {
    pictures_dir.join(ACQUISITION_DIR)
}

/// `<pictures>/Timelapses`
pub fn timelapse_root(pictures_dir: &Path) -> PathBuf {
    pictures_dir.join(TIMELAPSE_DIR)
}

/// Make a user-supplied experiment name safe to use as a folder name.
///
/// The result is always a single plain path component: never empty, never
/// `.`/`..`, and never hidden.
pub fn sanitize_experiment_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if "<>:\"/\\|?*".contains(c) { '_' } else { c })
        .collect();
    let joined = replaced.split_whitespace().collect::<Vec<_>>().join("_");
    let visible = joined.trim_start_matches('.');
    if visible.is_empty() {
        return DEFAULT_EXPERIMENT_NAME.to_string();
    }
    visible.chars().take(MAX_NAME_LEN).collect()
}

/// Capture interval, restricted to the supported set of minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    minutes: u32,
}

impl Interval {
    pub const ALLOWED_MINUTES: [u32; 7] = [1, 2, 5, 10, 15, 20, 30];

    pub fn from_minutes(minutes: u32) -> Result<Self, ConfigurationError> {
        if Self::ALLOWED_MINUTES.contains(&minutes) {
            Ok(Self { minutes })
        } else {
            Err(ConfigurationError::InvalidInterval { minutes })
        }
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.minutes) * 60)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min", self.minutes)
    }
}

/// Supported still resolutions of the HQ camera sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Resolution {
    /// 4056x3040, full sensor
    Full,
    /// 2028x1520
    #[default]
    Half,
    /// 1014x760
    Quarter,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [Resolution::Full, Resolution::Half, Resolution::Quarter];

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::Full => (4056, 3040),
            Resolution::Half => (2028, 1520),
            Resolution::Quarter => (1014, 760),
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{}x{}", w, h)
    }
}

impl FromStr for Resolution {
    type Err = ConfigurationError;

    /// Accepts `4056x3040` as well as the `4056 x 3040` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigurationError::InvalidResolution {
            value: s.to_string(),
        };
        let (w, h) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
        let w: u32 = w.trim().parse().map_err(|_| invalid())?;
        let h: u32 = h.trim().parse().map_err(|_| invalid())?;
        Resolution::ALL
            .into_iter()
            .find(|r| r.dimensions() == (w, h))
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for Resolution {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One time-lapse acquisition. Immutable once created.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub name: String,
    pub interval: Interval,
    pub resolution: Resolution,
    pub frame_count: u32,
    pub created_at: DateTime<Local>,
    pub folder: PathBuf,
}

impl Experiment {
    /// Build an experiment rooted at `acquisition_root`; the folder is
    /// `<acquisition_root>/<sanitized name>`.
    pub fn new(
        name: &str,
        interval: Interval,
        resolution: Resolution,
        frame_count: u32,
        acquisition_root: &Path,
    ) -> Result<Self, ConfigurationError> {
        if frame_count == 0 {
            return Err(ConfigurationError::InvalidFrameCount);
        }
        let name = sanitize_experiment_name(name);
        let folder = acquisition_root.join(&name);
        Ok(Self {
            name,
            interval,
            resolution,
            frame_count,
            created_at: Local::now(),
            folder,
        })
    }

    pub fn frame_path(&self, index: u32) -> PathBuf {
        self.folder.join(frame_file_name(index))
    }

    pub fn pending_path(&self, index: u32) -> PathBuf {
        self.folder.join(pending_file_name(index))
    }

    /// Create the experiment folder (and parents) if absent.
    pub fn create_folder(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.folder)
    }

    /// Whether the folder already contains numbered frames. A missing or
    /// unreadable folder has none.
    pub fn has_frames(&self) -> bool {
        let Ok(entries) = std::fs::read_dir(&self.folder) else {
            return false;
        };
        entries
            .filter_map(|entry| entry.ok())
            .any(|entry| parse_frame_index(&entry.file_name().to_string_lossy()).is_some())
    }

    pub fn manifest(&self) -> ExperimentManifest {
        let (width, height) = self.resolution.dimensions();
        ExperimentManifest {
            experiment: self.name.clone(),
            created_at: self.created_at,
            interval_minutes: self.interval.minutes(),
            resolution: ManifestResolution { width, height },
            total_photos: self.frame_count,
            folder: self.folder.clone(),
        }
    }

    /// Write `settings.json` into the experiment folder.
    pub fn write_manifest(&self) -> std::io::Result<PathBuf> {
        let path = self.folder.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&self.manifest()).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

/// A captured still, named by its position in the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u32,
    pub path: PathBuf,
    pub captured_at: DateTime<Local>,
}

/// Contents of `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentManifest {
    pub experiment: String,
    pub created_at: DateTime<Local>,
    pub interval_minutes: u32,
    pub resolution: ManifestResolution,
    pub total_photos: u32,
    pub folder: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestResolution {
    pub width: u32,
    pub height: u32,
}
