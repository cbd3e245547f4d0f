//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use petriwatch::experiment::{Interval, Resolution};

/// Parse and validate the capture interval in minutes
fn parse_interval(s: &str) -> Result<u32, String> {
    let minutes: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number of minutes", s))?;
    Interval::from_minutes(minutes)
        .map(|i| i.minutes())
        .map_err(|e| e.to_string())
}

/// Parse and validate resolution (WIDTHxHEIGHT format)
fn parse_resolution(s: &str) -> Result<Resolution, String> {
    s.parse().map_err(|e: petriwatch::ConfigurationError| e.to_string())
}

/// Parse and validate the number of photos (> 0)
fn parse_frame_count(s: &str) -> Result<u32, String> {
    let count: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number of photos", s))?;
    if count == 0 {
        return Err("Number of photos must be greater than 0".to_string());
    }
    Ok(count)
}

/// Parse and validate framerate (1-120 fps)
fn parse_framerate(s: &str) -> Result<u32, String> {
    let fps: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid framerate", s))?;
    if !(1..=120).contains(&fps) {
        return Err(format!(
            "Framerate must be between 1 and 120 fps, got {}",
            fps
        ));
    }
    Ok(fps)
}

/// Time-lapse capture for Petri dish experiments on a Raspberry Pi camera
#[derive(Parser, Debug)]
#[command(name = "petriwatch")]
#[command(version, about = "Time-lapse capture for Raspberry Pi camera experiments", long_about = None)]
#[command(after_help = "EXAMPLES:
    # 144 photos, one every 5 minutes, at 2028x1520
    petriwatch run --name ecoli-plate-3

    # Full sensor resolution every minute, compile video.mp4 at the end
    petriwatch run -n 60 -i 1 -r 4056x3040 --name yeast --auto-video

    # Compile that run's frames at 12 fps
    petriwatch compile --folder ~/Pictures/PetriWatch/yeast --fps 12

    # Compile a prepared folder under ~/Pictures/Timelapses
    petriwatch compile yeast-edit

    # Aim the camera
    petriwatch preview")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Pictures directory (default: from config, then ~/Pictures)
    #[arg(long, global = true)]
    pub pictures_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a time-lapse acquisition
    Run(RunArgs),
    /// Compile numbered frames into a video
    Compile(CompileArgs),
    /// Open the live camera preview until Ctrl+C
    Preview,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Experiment name, used as the folder name
    #[arg(long)]
    pub name: Option<String>,

    /// Minutes between photos: 1, 2, 5, 10, 15, 20 or 30
    #[arg(short, long, value_parser = parse_interval)]
    pub interval: Option<u32>,

    /// Resolution: 4056x3040, 2028x1520 or 1014x760
    #[arg(short, long, value_parser = parse_resolution)]
    pub resolution: Option<Resolution>,

    /// Number of photos
    #[arg(short = 'n', long, value_parser = parse_frame_count)]
    pub frames: Option<u32>,

    /// Compile a video when the run completes
    #[arg(long)]
    pub auto_video: bool,
}

#[derive(clap::Args, Debug)]
pub struct CompileArgs {
    /// Experiment under <pictures>/Timelapses
    #[arg(required_unless_present = "folder")]
    pub experiment: Option<String>,

    /// Frame folder to compile instead of a named experiment
    #[arg(long, conflicts_with = "experiment")]
    pub folder: Option<PathBuf>,

    /// Output file, relative to the frame folder (default: video.mp4)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Frames per second
    #[arg(long, value_parser = parse_framerate)]
    pub fps: Option<u32>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
