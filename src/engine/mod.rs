//! Audio Engine Module
//!
//! Core engine pieces:
//! - Audio buffer management and level math
//! - WAV encode/decode and resampling
//! - Media sources and the decode cache
//! - Engine configuration and the init/dispose lifecycle

pub mod buffer;
pub mod config;
pub mod context;
pub mod io;
pub mod media;

pub use buffer::{calculate_peak, calculate_rms, db_to_linear, linear_to_db, AudioBuffer};
pub use config::{EngineConfig, NoiseProfileConfig};
pub use context::AudioEngine;
pub use io::{decode_wav, encode_wav_16, export_wav, import_wav, resample};
pub use media::{DecodeCache, DirectoryMediaSource, InMemoryMediaSource, MediaSource};
