//! Splice - audio core of a timeline editor
//!
//! Splice renders the audio of a multi-track timeline project and provides
//! the processing a timeline editor needs around it:
//! - Offline rendering of a project time range to a stereo buffer
//! - A real-time mixing graph with mute/solo/volume/pan per track
//! - An effect chain (EQ, compression, gate, delay, reverb, denoise)
//! - Volume automation, fades and voice-driven ducking
//! - Spectral noise profiles, beat and loudness analysis
//!
//! # Architecture
//!
//! [`AudioEngine`] owns the caches and the mixing graph between `init` and
//! `dispose`. Everything else is plain functions over [`AudioBuffer`].

pub mod analysis;
pub mod automation;
pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod render;

pub use engine::{AudioBuffer, AudioEngine, EngineConfig};
pub use error::{Result, SpliceError};
