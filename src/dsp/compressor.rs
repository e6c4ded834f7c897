//! Compressor
//!
//! Feed-forward dynamics compressor: linked peak detection across channels, a
//! soft-knee gain computer, and one-pole attack/release smoothing of the gain
//! reduction.

use serde::{Deserialize, Serialize};

use super::effect::Processor;
use crate::engine::buffer::{db_to_linear, linear_to_db};
use crate::engine::AudioBuffer;

/// Level floor used by the gain computer for silent input
const LEVEL_FLOOR_DB: f32 = -120.0;

/// Compressor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorParams {
    /// Threshold in dB (-100 to 0)
    pub threshold: f32,
    /// Compression ratio (1 to 20)
    pub ratio: f32,
    /// Attack time in seconds (0 to 1)
    pub attack: f32,
    /// Release time in seconds (0 to 1)
    pub release: f32,
    /// Knee width in dB (0 = hard knee, up to 40)
    pub knee: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold: -24.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
            knee: 30.0,
        }
    }
}

impl CompressorParams {
    /// Clamp parameters to valid ranges
    pub fn clamp(&mut self) {
        let defaults = Self::default();
        self.threshold = or_default(self.threshold, defaults.threshold).clamp(-100.0, 0.0);
        self.ratio = or_default(self.ratio, defaults.ratio).clamp(1.0, 20.0);
        self.attack = or_default(self.attack, defaults.attack).clamp(0.0, 1.0);
        self.release = or_default(self.release, defaults.release).clamp(0.0, 1.0);
        self.knee = or_default(self.knee, defaults.knee).clamp(0.0, 40.0);
    }
}

fn or_default(value: f32, default: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

/// Compressor processing stage
#[derive(Debug, Clone)]
pub struct Compressor {
    params: CompressorParams,
    attack_coeff: f32,
    release_coeff: f32,
    /// Smoothed gain reduction (linear, 1.0 = none)
    gain_reduction: f32,
}

impl Compressor {
    /// Create a compressor; parameters are clamped
    pub fn new(mut params: CompressorParams, sample_rate: u32) -> Self {
        params.clamp();
        Self {
            attack_coeff: time_coefficient(params.attack, sample_rate),
            release_coeff: time_coefficient(params.release, sample_rate),
            params,
            gain_reduction: 1.0,
        }
    }

    pub fn params(&self) -> &CompressorParams {
        &self.params
    }

    /// Current gain reduction in dB for metering
    pub fn gain_reduction_db(&self) -> f32 {
        linear_to_db(self.gain_reduction).max(LEVEL_FLOOR_DB)
    }

    /// Gain change in dB (zero or negative) for a detector level in dB
    fn compute_gain_reduction_db(&self, input_db: f32) -> f32 {
        let threshold = self.params.threshold;
        let ratio = self.params.ratio;
        let knee = self.params.knee;

        if knee > 0.0 {
            let knee_start = threshold - knee / 2.0;
            let knee_end = threshold + knee / 2.0;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (threshold + (input_db - threshold) / ratio) - input_db
            } else {
                // Quadratic blend from 1:1 at the knee start to the full ratio
                let over = input_db - knee_start;
                let slope = (1.0 / ratio - 1.0) * over / (2.0 * knee);
                slope * over
            }
        } else if input_db <= threshold {
            0.0
        } else {
            (threshold + (input_db - threshold) / ratio) - input_db
        }
    }
}

impl Processor for Compressor {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let num_channels = buffer.num_channels();
        for frame in 0..buffer.num_frames() {
            // Linked detection: loudest channel drives every channel
            let mut level: f32 = 0.0;
            for ch in 0..num_channels {
                level = level.max(buffer.channel(ch)[frame].abs());
            }
            let input_db = linear_to_db(level).max(LEVEL_FLOOR_DB);
            let target = db_to_linear(self.compute_gain_reduction_db(input_db));

            let coeff = if target < self.gain_reduction {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain_reduction = coeff * self.gain_reduction + (1.0 - coeff) * target;

            let gain = self.gain_reduction;
            for ch in 0..num_channels {
                buffer.channel_mut(ch)[frame] *= gain;
            }
        }
    }

    fn reset(&mut self) {
        self.gain_reduction = 1.0;
    }

    fn kind(&self) -> &'static str {
        "compressor"
    }
}

/// One-pole smoothing coefficient: exp(-1 / (time * sample_rate))
#[inline]
pub(crate) fn time_coefficient(time_secs: f32, sample_rate: u32) -> f32 {
    let samples = time_secs * sample_rate as f32;
    if samples <= 0.0 {
        0.0
    } else {
        (-1.0 / samples).exp()
    }
}
