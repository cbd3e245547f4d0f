//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use petriwatch::acquisition::{AcquisitionLoop, RunController, RunEvent, RunOutcome, RunRequest};
use petriwatch::capture::{is_raspberry_pi, CommandCamera};
use petriwatch::config::{default_path, Config, DEFAULT_CONFIG};
use petriwatch::experiment::{frame_file_name, sanitize_experiment_name, timelapse_root};
use petriwatch::preview::Preview;
use petriwatch::schedule::{CancelToken, SystemClock};
use petriwatch::video;

use super::args::{CompileArgs, ConfigAction, RunArgs};

/// Start an acquisition and print its progress until it ends.
pub fn run(args: RunArgs, config: &Config, pictures_dir: &Path) -> Result<(), String> {
    if !is_raspberry_pi() {
        eprintln!("Warning: petriwatch is intended to run on a Raspberry Pi.");
    }

    let request = RunRequest {
        experiment_name: args.name.unwrap_or_else(|| config.run.experiment.clone()),
        interval_minutes: args.interval.unwrap_or(config.run.interval_minutes),
        resolution: args.resolution.unwrap_or(config.run.resolution),
        frame_count: args.frames.unwrap_or(config.run.frames),
        auto_video: args.auto_video || config.run.auto_video,
        pictures_dir: pictures_dir.to_path_buf(),
    };
    let experiment = request.validate().map_err(|e| e.to_string())?;

    let camera = CommandCamera::new(config.camera_settings()).map_err(|e| e.to_string())?;
    let acquisition = AcquisitionLoop::new(camera, config.encoder(), Arc::new(SystemClock::new()))
        .with_video(config.video.fps, &config.video.filename);

    let controller = RunController::new();
    let handle = controller
        .start(acquisition, request)
        .map_err(|e| e.to_string())?;

    let cancel = handle.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nStop requested, stopping before the next photo...");
        cancel.cancel();
    }) {
        eprintln!("Warning: Could not set up Ctrl+C handler: {}", e);
    }

    println!(
        "{} photos every {} at {} into {}",
        experiment.frame_count,
        experiment.interval,
        experiment.resolution,
        experiment.folder.display()
    );
    println!("Press Ctrl+C to stop.\n");

    for event in handle.events().iter() {
        print_event(&event);
    }

    match handle.wait().map_err(|e| e.to_string())? {
        RunOutcome::Completed { frames, video } => {
            println!("\nFinished. {} photos taken.", frames);
            if let Some(video) = video {
                println!("Video: {}", video.display());
            }
            Ok(())
        }
        RunOutcome::Cancelled { frames } => {
            println!("\nStopped. {} photos taken.", frames);
            Ok(())
        }
        RunOutcome::Failed { frames, error } => {
            Err(format!("{} ({} photos kept)", error, frames))
        }
    }
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::FrameCaptured(frame) => {
            println!(
                "{}  Captured {}",
                frame.captured_at.format("%Y-%m-%d %H:%M:%S"),
                frame_file_name(frame.index)
            );
        }
        RunEvent::Progress(snapshot) => {
            println!(
                "{}/{} photos taken ({:.0}%).",
                snapshot.current,
                snapshot.total,
                snapshot.fraction() * 100.0
            );
        }
        RunEvent::Waiting { next_index, wait } => {
            println!("Next photo ({}) in {}", next_index, format_wait(*wait));
        }
        RunEvent::Retrying { index, reason } => {
            eprintln!("Photo {} failed, retrying: {}", index, reason);
        }
        RunEvent::Error(message) => eprintln!("ERROR: {}", message),
        RunEvent::StateChanged(status) => log::debug!("Run {}", status),
    }
}

/// `4m 05s` style wait description.
fn format_wait(wait: Duration) -> String {
    let secs = wait.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Compile frames into a video.
pub fn compile(args: CompileArgs, config: &Config, pictures_dir: &Path) -> Result<(), String> {
    let folder = match (args.folder, args.experiment) {
        (Some(folder), _) => folder,
        (None, Some(name)) => timelapse_root(pictures_dir).join(sanitize_experiment_name(&name)),
        (None, None) => return Err("Give an experiment name or --folder".to_string()),
    };
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.video.filename));
    let fps = args.fps.unwrap_or(config.video.fps);

    println!("Compiling {} at {} fps...", folder.display(), fps);
    let mut encoder = config.encoder();
    let path = video::compile(&folder, &output, fps, &mut encoder).map_err(|e| e.to_string())?;
    println!("Video created: {}", path.display());
    Ok(())
}

/// Show the camera preview until Ctrl+C or until the preview exits.
pub fn preview(config: &Config) -> Result<(), String> {
    let stop = CancelToken::new();
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_stop.cancel()) {
        eprintln!("Warning: Could not set up Ctrl+C handler: {}", e);
    }

    let mut preview = Preview::start(&config.preview_settings()).map_err(|e| e.to_string())?;
    println!("Preview open. Press Ctrl+C to close.");
    while !stop.is_cancelled() && preview.is_running() {
        thread::sleep(Duration::from_millis(200));
    }
    preview.stop().map_err(|e| format!("Failed to stop preview: {}", e))?;
    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(
    action: ConfigAction,
    config: &Config,
    config_path: Option<&Path>,
    pictures_dir: &Path,
) -> Result<(), String> {
    let config_path = config_path.map(PathBuf::from).unwrap_or_else(default_path);
    match action {
        ConfigAction::Show => {
            println!("Current configuration:");
            println!("  Pictures dir: {}", pictures_dir.display());
            println!(
                "  Camera command: {}",
                config
                    .camera
                    .command
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "auto (rpicam-still, libcamera-still)".to_string())
            );
            println!(
                "  Flip: h={} v={}",
                yes_no(config.camera.hflip),
                yes_no(config.camera.vflip)
            );
            println!("  Capture timeout: {}s", config.camera.timeout_secs);
            println!("  Encoder: {} (crf {})", config.video.encoder, config.video.crf);
            println!("  Video: {} at {} fps", config.video.filename, config.video.fps);
            println!("  Experiment: {}", config.run.experiment);
            println!("  Interval: {} min", config.run.interval_minutes);
            println!("  Resolution: {}", config.run.resolution);
            println!("  Photos: {}", config.run.frames);
            println!("  Auto video: {}", yes_no(config.run.auto_video));
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
            Ok(())
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(format!(
                    "Config file already exists: {}\nUse 'petriwatch config show' to view current settings.",
                    config_path.display()
                ));
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Error creating config directory: {}", e))?;
            }
            std::fs::write(&config_path, DEFAULT_CONFIG)
                .map_err(|e| format!("Error writing config file: {}", e))?;
            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
