mod cli;

use clap::Parser;
use cli::{Args, Command};
use petriwatch::config::Config;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config_path = args.config.clone();

    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let pictures_dir = args
        .pictures_dir
        .clone()
        .unwrap_or_else(|| config.pictures_dir());

    let result = match args.command {
        Command::Run(run) => cli::run(run, &config, &pictures_dir),
        Command::Compile(compile) => cli::compile(compile, &config, &pictures_dir),
        Command::Preview => cli::preview(&config),
        Command::Config { action } => {
            cli::handle_config_action(action, &config, config_path.as_deref(), &pictures_dir)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
