//! Splice CLI - timeline audio core
//!
//! Command-line interface for rendering and analyzing timeline audio.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use splice::cli::commands;
use splice::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Splice v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Some(cmd) => handle_command(cmd, config),
        None => {
            println!("Splice v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: splice::EngineConfig) -> Result<()> {
    match cmd {
        Commands::Render {
            project,
            media,
            start,
            duration,
            output,
        } => commands::render(config, &project, &media, start, duration, &output),
        Commands::Beats { input } => commands::beats(config, &input),
        Commands::Loudness { input } => commands::loudness(&input),
        Commands::Silence {
            input,
            threshold_db,
        } => commands::silence(&input, threshold_db),
        Commands::Denoise {
            input,
            noise,
            reduction,
            output,
        } => commands::denoise(config, &input, &noise, reduction, &output),
        Commands::Duck {
            background,
            foreground,
            output,
        } => commands::duck(config, &background, &foreground, &output),
    }
}
