//! Noise profiling and profile-driven noise reduction
//!
//! A profile is the average Hann-windowed magnitude spectrum of a noise-only
//! recording. Reduction turns a profile into a fixed series of biquad filters
//! with a three-pass heuristic:
//!
//! 1. Tonal peaks: narrow notches on sharp local maxima well above the mean.
//! 2. Broadband bands: octave-wide peaking cuts where a band sits above the mean.
//! 3. Rumble: a high-pass when the low end is heavy, or a gentle one when
//!    nothing else was produced so the chain is never empty.
//!
//! The same profile and reduction always yield the same filters, and every
//! call starts from fresh filter state, so output is bit-for-bit repeatable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fft::{hann_window, magnitude, SpectralAnalyzer};
use crate::dsp::effect::Processor;
use crate::dsp::eq::{Biquad, FilterType};
use crate::engine::config::NoiseProfileConfig;
use crate::engine::AudioBuffer;
use crate::error::{Result, SpliceError};

// ============================================================================
// Constants
// ============================================================================

/// Tonal peaks below this frequency are left to the rumble pass
const MIN_PEAK_HZ: f32 = 60.0;

/// Peaks must exceed `mean + PEAK_SIGMA * stddev`
const PEAK_SIGMA: f32 = 2.0;

const NOTCH_Q_PER_RATIO: f32 = 5.0;
const NOTCH_Q_MIN: f32 = 5.0;
const NOTCH_Q_MAX: f32 = 30.0;

/// Bins on either side of a notch that later peaks may not reuse
const CLAIM_RADIUS: usize = 2;

const BAND_CENTERS: [f32; 7] = [125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0];
const BAND_THRESHOLD: f32 = 1.2;
const BAND_MAX_CUT_DB: f32 = 12.0;
const BAND_SLOPE_DB: f32 = 6.0;
const BAND_Q: f32 = 1.414;

const RUMBLE_LIMIT_HZ: f32 = 200.0;
const RUMBLE_THRESHOLD: f32 = 1.5;
const RUMBLE_CUTOFF_HZ: f32 = 80.0;
const FALLBACK_CUTOFF_HZ: f32 = 60.0;
const BUTTERWORTH_Q: f32 = 0.7071;

// ============================================================================
// Profile
// ============================================================================

/// Average noise magnitude spectrum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseProfile {
    /// Center frequency of each bin in Hz
    pub frequency_bins: Vec<f32>,
    /// Average magnitude per bin; `fft_size / 2` entries
    pub magnitudes: Vec<f32>,
    pub sample_rate: u32,
    pub fft_size: usize,
}

impl NoiseProfile {
    /// Width of one bin in Hz
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.fft_size as f32
    }

    fn bin_of(&self, frequency: f32) -> usize {
        (frequency / self.bin_hz()).round() as usize
    }
}

/// Learn a profile from the first channel of `buffer`
///
/// Frames overlap by `frame_size - hop_size`. A buffer shorter than one frame
/// is zero-padded into a single frame.
pub fn learn_profile(buffer: &AudioBuffer, config: &NoiseProfileConfig) -> Result<NoiseProfile> {
    let frame_size = config.frame_size;
    let hop = config.hop_size.max(1);
    let fft = SpectralAnalyzer::new(frame_size)?;
    let window = hann_window(frame_size);
    let samples = buffer.channel(0);

    let mut starts: Vec<usize> = (0..)
        .map(|k| k * hop)
        .take_while(|&start| start + frame_size <= samples.len())
        .collect();
    if starts.is_empty() {
        starts.push(0);
    }

    let mut sum = vec![0.0_f64; frame_size / 2];
    let mut frame = vec![0.0_f32; frame_size];
    for &start in &starts {
        for (i, slot) in frame.iter_mut().enumerate() {
            *slot = samples.get(start + i).copied().unwrap_or(0.0) * window[i];
        }
        let mags = magnitude(&fft.forward(&frame)?);
        for (acc, m) in sum.iter_mut().zip(mags) {
            *acc += m as f64;
        }
    }

    let count = starts.len() as f64;
    let bin_hz = buffer.sample_rate() as f32 / frame_size as f32;
    Ok(NoiseProfile {
        frequency_bins: (0..frame_size / 2).map(|i| i as f32 * bin_hz).collect(),
        magnitudes: sum.into_iter().map(|s| (s / count) as f32).collect(),
        sample_rate: buffer.sample_rate(),
        fft_size: frame_size,
    })
}

// ============================================================================
// Filter synthesis
// ============================================================================

/// One synthesized filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub filter_type: FilterType,
    pub frequency: f32,
    pub gain_db: f32,
    pub q: f32,
}

/// Derive the reduction filter series for a profile
///
/// `reduction` (0 to 1) scales the broadband cuts; notches and high-passes do
/// not depend on it.
pub fn synthesize_filters(profile: &NoiseProfile, reduction: f32) -> Vec<FilterSpec> {
    let reduction = if reduction.is_finite() { reduction.clamp(0.0, 1.0) } else { 0.0 };
    let mags = &profile.magnitudes;
    let n = mags.len();
    let mut filters = Vec::new();
    if n == 0 {
        return vec![high_pass(FALLBACK_CUTOFF_HZ)];
    }

    let mean = mags.iter().sum::<f32>() / n as f32;
    let variance = mags.iter().map(|m| (m - mean) * (m - mean)).sum::<f32>() / n as f32;
    let stddev = variance.sqrt();
    let mut claimed = vec![false; n];

    // Pass 1: tonal peaks
    let peak_floor = mean + PEAK_SIGMA * stddev;
    let first_bin = profile.bin_of(MIN_PEAK_HZ).max(2);
    for i in first_bin..n.saturating_sub(2) {
        if claimed[i] {
            continue;
        }
        let m = mags[i];
        let is_local_max =
            m > mags[i - 1] && m > mags[i + 1] && m >= mags[i - 2] && m >= mags[i + 2];
        if !is_local_max || m <= peak_floor {
            continue;
        }
        let neighbours = (mags[i - 2] + mags[i - 1] + mags[i + 1] + mags[i + 2]) / 4.0;
        let ratio = if neighbours > 0.0 { m / neighbours } else { NOTCH_Q_MAX };
        filters.push(FilterSpec {
            filter_type: FilterType::Notch,
            frequency: profile.frequency_bins[i],
            gain_db: 0.0,
            q: (ratio * NOTCH_Q_PER_RATIO).clamp(NOTCH_Q_MIN, NOTCH_Q_MAX),
        });
        for slot in &mut claimed[i.saturating_sub(CLAIM_RADIUS)..(i + CLAIM_RADIUS + 1).min(n)] {
            *slot = true;
        }
    }

    // Pass 2: broadband octave bands
    if mean > 0.0 {
        for &center in &BAND_CENTERS {
            let center_bin = profile.bin_of(center);
            if center_bin >= n || claimed[center_bin] {
                continue;
            }
            let lo = profile.bin_of(center / std::f32::consts::SQRT_2).max(1);
            let hi = profile.bin_of(center * std::f32::consts::SQRT_2).min(n - 1);
            if hi < lo {
                continue;
            }
            let band_avg = mags[lo..=hi].iter().sum::<f32>() / (hi - lo + 1) as f32;
            if band_avg > mean * BAND_THRESHOLD {
                let excess = BAND_SLOPE_DB * (band_avg - mean) / mean;
                filters.push(FilterSpec {
                    filter_type: FilterType::Peaking,
                    frequency: center,
                    gain_db: -reduction * excess.min(BAND_MAX_CUT_DB),
                    q: BAND_Q,
                });
            }
        }
    }

    // Pass 3: rumble
    let rumble_end = profile.bin_of(RUMBLE_LIMIT_HZ).clamp(2, n);
    let low = &mags[1..rumble_end];
    let low_avg = if low.is_empty() {
        0.0
    } else {
        low.iter().sum::<f32>() / low.len() as f32
    };
    if mean > 0.0 && low_avg > mean * RUMBLE_THRESHOLD {
        filters.push(high_pass(RUMBLE_CUTOFF_HZ));
    } else if filters.is_empty() {
        filters.push(high_pass(FALLBACK_CUTOFF_HZ));
    }

    filters
}

fn high_pass(frequency: f32) -> FilterSpec {
    FilterSpec {
        filter_type: FilterType::HighPass,
        frequency,
        gain_db: 0.0,
        q: BUTTERWORTH_Q,
    }
}

/// Run `buffer` through the filters synthesized for `profile`
///
/// Returns a new buffer with the same length, rate and channel count.
pub fn apply_noise_reduction(
    buffer: &AudioBuffer,
    profile: &NoiseProfile,
    reduction: f32,
) -> AudioBuffer {
    let specs = synthesize_filters(profile, reduction);
    debug!(filters = specs.len(), reduction, "synthesized noise reduction filters");

    let sample_rate = buffer.sample_rate();
    let mut output = buffer.clone();
    for spec in &specs {
        Biquad::design(spec.filter_type, sample_rate, spec.frequency, spec.gain_db, spec.q)
            .process(&mut output);
    }
    output
}

// ============================================================================
// Profile store
// ============================================================================

/// In-memory profiles keyed by caller-chosen id; never expired
#[derive(Debug, Clone, Default)]
pub struct NoiseProfileStore {
    profiles: HashMap<String, NoiseProfile>,
}

impl NoiseProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn a profile from `buffer` and store it under `id`, replacing any
    /// previous profile with that id
    pub fn learn(
        &mut self,
        buffer: &AudioBuffer,
        id: impl Into<String>,
        config: &NoiseProfileConfig,
    ) -> Result<&NoiseProfile> {
        let id = id.into();
        let profile = learn_profile(buffer, config)?;
        debug!(id = %id, bins = profile.magnitudes.len(), "learned noise profile");
        self.profiles.insert(id.clone(), profile);
        self.get(&id)
    }

    pub fn insert(&mut self, id: impl Into<String>, profile: NoiseProfile) {
        self.profiles.insert(id.into(), profile);
    }

    /// Look up a profile; unknown ids fail with `NotFound`
    pub fn get(&self, id: &str) -> Result<&NoiseProfile> {
        self.profiles
            .get(id)
            .ok_or_else(|| SpliceError::not_found("noise profile", id))
    }

    /// Apply the stored profile `id` to `buffer`
    pub fn apply(&self, buffer: &AudioBuffer, id: &str, reduction: f32) -> Result<AudioBuffer> {
        let profile = self.get(id)?;
        Ok(apply_noise_reduction(buffer, profile, reduction))
    }

    pub fn remove(&mut self, id: &str) -> Option<NoiseProfile> {
        self.profiles.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.profiles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn clear(&mut self) {
        self.profiles.clear();
    }
}
