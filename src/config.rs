//! Configuration file handling for petriwatch.
//!
//! Loads configuration from `~/.config/petriwatch/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CommandCameraSettings;
use crate::experiment::Resolution;
use crate::preview::PreviewSettings;
use crate::video::{FfmpegEncoder, DEFAULT_CRF, DEFAULT_FPS, DEFAULT_VIDEO_FILENAME};

/// Configuration file structure for petriwatch.
/// Loaded from ~/.config/petriwatch/config.toml (or custom path via --config).
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct PathsConfig {
    /// Root for `PetriWatch/` and `Timelapses/`; defaults to the user's Pictures folder
    pub pictures_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct CameraConfig {
    /// Still-capture program; auto-detected when unset
    pub command: Option<PathBuf>,
    /// Preview program; auto-detected when unset
    pub preview_command: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub hflip: bool,
    #[serde(default = "default_true")]
    pub vflip: bool,
    #[serde(default = "default_capture_timeout")]
    pub timeout_secs: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: None,
            preview_command: None,
            hflip: true,
            vflip: true,
            timeout_secs: default_capture_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_encoder")]
    pub encoder: String,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_video_filename")]
    pub filename: String,
    #[serde(default = "default_encode_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_crf")]
    pub crf: u8,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            encoder: default_encoder(),
            fps: default_fps(),
            filename: default_video_filename(),
            timeout_secs: default_encode_timeout(),
            crf: default_crf(),
        }
    }
}

/// Defaults for `petriwatch run` options.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_experiment")]
    pub experiment: String,
    #[serde(default = "default_interval")]
    pub interval_minutes: u32,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_frames")]
    pub frames: u32,
    #[serde(default)]
    pub auto_video: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            experiment: default_experiment(),
            interval_minutes: default_interval(),
            resolution: Resolution::default(),
            frames: default_frames(),
            auto_video: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_capture_timeout() -> u64 {
    60
}

fn default_encoder() -> String {
    "ffmpeg".to_string()
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

fn default_video_filename() -> String {
    DEFAULT_VIDEO_FILENAME.to_string()
}

fn default_encode_timeout() -> u64 {
    30 * 60
}

fn default_crf() -> u8 {
    DEFAULT_CRF
}

fn default_experiment() -> String {
    "timelapse".to_string()
}

fn default_interval() -> u32 {
    5
}

fn default_frames() -> u32 {
    144
}

impl Config {
    /// Load `path`, or the default location when `None`.
    ///
    /// A file that does not exist yields the built-in defaults; sections
    /// and keys left out of an existing file fall back individually.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map_or_else(default_path, Path::to_path_buf);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                return Ok(Config::default());
            }
            Err(source) => return Err(ConfigError::Unreadable { path, source }),
        };
        let config = toml::from_str(&content).map_err(|source| ConfigError::Invalid {
            path: path.clone(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Effective pictures directory.
    pub fn pictures_dir(&self) -> PathBuf {
        self.paths
            .pictures_dir
            .clone()
            .unwrap_or_else(default_pictures_dir)
    }

    pub fn camera_settings(&self) -> CommandCameraSettings {
        CommandCameraSettings {
            program: self.camera.command.clone(),
            hflip: self.camera.hflip,
            vflip: self.camera.vflip,
            timeout: Duration::from_secs(self.camera.timeout_secs),
        }
    }

    pub fn preview_settings(&self) -> PreviewSettings {
        PreviewSettings {
            program: self.camera.preview_command.clone(),
            hflip: self.camera.hflip,
            vflip: self.camera.vflip,
        }
    }

    pub fn encoder(&self) -> FfmpegEncoder {
        FfmpegEncoder::new(
            self.video.encoder.clone(),
            self.video.crf,
            Duration::from_secs(self.video.timeout_secs),
        )
    }
}

/// A config file that exists but cannot be used. A missing file is not an
/// error; defaults apply.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Bad TOML, or a value outside what petriwatch accepts (such as an
    /// unsupported resolution)
    #[error("invalid settings in {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("petriwatch").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/petriwatch/config.toml")
        })
}

/// The user's Pictures folder, falling back to `$HOME/Pictures`.
pub fn default_pictures_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Pictures")))
        .unwrap_or_else(|| PathBuf::from("Pictures"))
}

/// Commented default configuration written by `config init`.
pub const DEFAULT_CONFIG: &str = r#"# petriwatch configuration

[paths]
# Frames go to <pictures_dir>/PetriWatch/<experiment>/
# pictures_dir = "/home/pi/Pictures"

[camera]
# Still-capture program (default: rpicam-still, then libcamera-still)
# command = "rpicam-still"
# Preview program (default: rpicam-hello, then libcamera-hello)
# preview_command = "rpicam-hello"
hflip = true
vflip = true
# Seconds before a hung capture is killed
timeout_secs = 60

[video]
encoder = "ffmpeg"
fps = 24
filename = "video.mp4"
timeout_secs = 1800
crf = 23

[run]
experiment = "timelapse"
# One of 1, 2, 5, 10, 15, 20, 30
interval_minutes = 5
# One of 4056x3040, 2028x1520, 1014x760
resolution = "2028x1520"
frames = 144
auto_video = false
"#;
