//! Audio Analysis
//!
//! FFT spectra, learned noise profiles, onset/tempo detection, presence and
//! silence detection, and loudness measurement.

pub mod beat;
pub mod denoise;
pub mod fft;
pub mod loudness;
pub mod presence;

pub use beat::{
    analyze_audio_buffer, analyze_from_blob, detect_onsets, Beat, BeatAnalysisResult, BeatConfig,
    Onset,
};
#[cfg(feature = "remote")]
pub use beat::analyze_from_url;
pub use denoise::{
    apply_noise_reduction, learn_profile, synthesize_filters, FilterSpec, NoiseProfile,
    NoiseProfileStore,
};
pub use fft::{hann_window, magnitude, power, SpectralAnalyzer, Spectrum};
pub use loudness::{detect_silence, measure_loudness, LoudnessMeasurement, SilenceRange};
pub use presence::{detect_presence, merge_ranges, PresenceRange, DEFAULT_PRESENCE_WINDOW};
