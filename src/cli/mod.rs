//! CLI Module
//!
//! Command-line interface for the Splice audio core.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Splice - render, analyze and process timeline audio
#[derive(Parser, Debug)]
#[command(name = "splice")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a time range of a project to WAV
    #[command(name = "render")]
    Render {
        /// Project JSON file
        project: PathBuf,

        /// Directory holding the project's media as <media-id>.wav
        #[arg(short, long)]
        media: PathBuf,

        /// Range start in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f64,

        /// Range length in seconds; defaults to the end of the last clip
        #[arg(long)]
        duration: Option<f64>,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Detect tempo, beats and downbeats
    #[command(name = "beats")]
    Beats {
        /// Input WAV file
        input: PathBuf,
    },

    /// Measure RMS, peak and approximate LUFS
    #[command(name = "loudness")]
    Loudness {
        /// Input WAV file
        input: PathBuf,
    },

    /// List silent ranges
    #[command(name = "silence")]
    Silence {
        /// Input WAV file
        input: PathBuf,

        /// Peak level below which a window is silent
        #[arg(long, default_value_t = -50.0, allow_hyphen_values = true)]
        threshold_db: f32,
    },

    /// Learn a noise profile and reduce it in a file
    #[command(name = "denoise")]
    Denoise {
        /// Input WAV file
        input: PathBuf,

        /// Noise-only WAV file to learn the profile from
        #[arg(short, long)]
        noise: PathBuf,

        /// Reduction amount (0 to 1)
        #[arg(short, long, default_value_t = 0.5)]
        reduction: f32,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Duck a background file under a foreground voice
    #[command(name = "duck")]
    Duck {
        /// Background (music) WAV file
        background: PathBuf,

        /// Foreground (voice) WAV file
        foreground: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,
    },
}
