//! Biquad filters and EQ bands
//!
//! Every filter in the crate (EQ bands, synthesized noise-reduction notches
//! and cuts, the interactive noise-reduction bank) is a single RBJ biquad
//! stage. An EQ effect becomes a ladder of these stages in band order.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::effect::Processor;
use crate::engine::AudioBuffer;
use crate::error::{Result, SpliceError};

/// Filter shape of a biquad stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// Bell curve boost/cut
    #[default]
    Peaking,
    /// Boost/cut below frequency
    LowShelf,
    /// Boost/cut above frequency
    HighShelf,
    /// Remove above frequency
    LowPass,
    /// Remove below frequency
    HighPass,
    /// Narrow rejection at frequency
    Notch,
}

/// Normalized biquad coefficients (a0 == 1)
///
/// H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::UNITY
    }
}

impl BiquadCoeffs {
    const UNITY: BiquadCoeffs = BiquadCoeffs {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Audio EQ Cookbook coefficients
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    pub(crate) fn calculate(
        filter_type: FilterType,
        sample_rate: f64,
        frequency: f64,
        gain_db: f64,
        q: f64,
    ) -> Self {
        // Keep the corner strictly below Nyquist
        let freq = frequency.clamp(10.0, sample_rate / 2.0 - 1.0);
        let q = q.clamp(0.1, 30.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);
        let a = 10.0_f64.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Peaking => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            FilterType::LowShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::HighShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::HighPass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::Notch => (
                1.0,
                -2.0 * cos_w0,
                1.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    fn is_unity(&self) -> bool {
        *self == Self::UNITY
    }
}

/// Direct Form I history for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f64, c: &BiquadCoeffs) -> f64 {
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

// ============================================================================
// EQ Band
// ============================================================================

/// Single EQ band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EQBand {
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    /// Center/corner frequency in Hz (20-20000)
    pub frequency: f32,
    /// Gain in dB (-24 to +24); ignored by pass and notch filters
    #[serde(rename = "gain")]
    pub gain_db: f32,
    /// Q factor (0.1 to 18)
    pub q: f32,
    pub enabled: bool,
}

impl Default for EQBand {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Peaking,
            frequency: 1000.0,
            gain_db: 0.0,
            q: 1.0,
            enabled: true,
        }
    }
}

impl EQBand {
    pub fn new(filter_type: FilterType, frequency: f32, gain_db: f32, q: f32) -> Self {
        Self {
            filter_type,
            frequency,
            gain_db,
            q,
            enabled: true,
        }
    }

    pub fn peaking(frequency: f32, gain_db: f32, q: f32) -> Self {
        Self::new(FilterType::Peaking, frequency, gain_db, q)
    }

    pub fn low_shelf(frequency: f32, gain_db: f32) -> Self {
        Self::new(FilterType::LowShelf, frequency, gain_db, 0.7071)
    }

    pub fn high_shelf(frequency: f32, gain_db: f32) -> Self {
        Self::new(FilterType::HighShelf, frequency, gain_db, 0.7071)
    }

    pub fn low_pass(frequency: f32, q: f32) -> Self {
        Self::new(FilterType::LowPass, frequency, 0.0, q)
    }

    pub fn high_pass(frequency: f32, q: f32) -> Self {
        Self::new(FilterType::HighPass, frequency, 0.0, q)
    }

    pub fn notch(frequency: f32, q: f32) -> Self {
        Self::new(FilterType::Notch, frequency, 0.0, q)
    }

    /// Validate band parameters
    pub fn validate(&self) -> Result<()> {
        if !(20.0..=20000.0).contains(&self.frequency) {
            return Err(SpliceError::InvalidParameter {
                param: "frequency".to_string(),
                value: self.frequency.to_string(),
                expected: "20-20000 Hz".to_string(),
            });
        }
        if !(-24.0..=24.0).contains(&self.gain_db) {
            return Err(SpliceError::InvalidParameter {
                param: "gain".to_string(),
                value: self.gain_db.to_string(),
                expected: "-24 to +24 dB".to_string(),
            });
        }
        if !(0.1..=18.0).contains(&self.q) {
            return Err(SpliceError::InvalidParameter {
                param: "q".to_string(),
                value: self.q.to_string(),
                expected: "0.1 to 18".to_string(),
            });
        }
        Ok(())
    }

    /// Clamp parameters to valid ranges
    pub fn clamp(&mut self) {
        self.frequency = finite_or(self.frequency, 1000.0).clamp(20.0, 20000.0);
        self.gain_db = finite_or(self.gain_db, 0.0).clamp(-24.0, 24.0);
        self.q = finite_or(self.q, 1.0).clamp(0.1, 18.0);
    }

    /// Whether this band leaves the signal untouched
    pub fn is_bypass(&self) -> bool {
        !self.enabled
            || match self.filter_type {
                FilterType::Peaking | FilterType::LowShelf | FilterType::HighShelf => {
                    self.gain_db.abs() < 0.01
                }
                FilterType::LowPass | FilterType::HighPass | FilterType::Notch => false,
            }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

// ============================================================================
// Biquad processor
// ============================================================================

/// One biquad stage with per-channel history
#[derive(Debug, Clone)]
pub struct Biquad {
    filter_type: FilterType,
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
}

impl Biquad {
    /// Build a stage for `band` at `sample_rate`
    ///
    /// A bypassed band yields unity coefficients.
    pub fn from_band(band: &EQBand, sample_rate: u32) -> Self {
        let coeffs = if band.is_bypass() {
            BiquadCoeffs::UNITY
        } else {
            BiquadCoeffs::calculate(
                band.filter_type,
                sample_rate as f64,
                band.frequency as f64,
                band.gain_db as f64,
                band.q as f64,
            )
        };
        Self {
            filter_type: band.filter_type,
            coeffs,
            states: Vec::new(),
        }
    }

    /// Build a stage without the user-facing Q limit (notches go up to Q 30)
    pub fn design(
        filter_type: FilterType,
        sample_rate: u32,
        frequency: f32,
        gain_db: f32,
        q: f32,
    ) -> Self {
        Self {
            filter_type,
            coeffs: BiquadCoeffs::calculate(
                filter_type,
                sample_rate as f64,
                frequency as f64,
                gain_db as f64,
                q as f64,
            ),
            states: Vec::new(),
        }
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }
}

impl Processor for Biquad {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.coeffs.is_unity() {
            return;
        }
        if self.states.len() < buffer.num_channels() {
            self.states
                .resize_with(buffer.num_channels(), BiquadState::default);
        }
        let coeffs = self.coeffs;
        for (channel, state) in buffer.channels_mut().zip(self.states.iter_mut()) {
            for sample in channel.iter_mut() {
                *sample = state.process(*sample as f64, &coeffs) as f32;
            }
        }
    }

    fn reset(&mut self) {
        self.states.clear();
    }

    fn kind(&self) -> &'static str {
        "biquad"
    }
}
