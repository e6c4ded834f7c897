//! Interactive noise-reduction bank
//!
//! A fixed set of nine octave-spaced peaking cuts followed by a downward gate.
//! The cuts are weighted toward low hum and high hiss; `strength` scales all
//! of them together. This is the cheap, profile-free counterpart to the
//! learned filters in [`crate::analysis::denoise`].

use serde::{Deserialize, Serialize};

use super::effect::Processor;
use super::eq::{Biquad, FilterType};
use super::gate::{Gate, GateParams};

/// Band centers in Hz
pub const BAND_CENTERS: [f32; 9] = [
    31.5, 63.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0,
];

/// Relative cut depth per band
const BAND_WEIGHTS: [f32; 9] = [1.0, 0.8, 0.5, 0.3, 0.2, 0.2, 0.35, 0.6, 0.9];

/// Maximum cut at strength 1 and weight 1
const MAX_CUT_DB: f32 = 12.0;

/// Octave-wide bands
const BAND_Q: f32 = 1.4;

/// Noise-reduction effect parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseReductionParams {
    /// Overall reduction amount (0 to 1)
    pub strength: f32,
    /// Gate threshold in dB (-100 to 0)
    pub threshold_db: f32,
}

impl Default for NoiseReductionParams {
    fn default() -> Self {
        Self {
            strength: 0.5,
            threshold_db: -50.0,
        }
    }
}

impl NoiseReductionParams {
    /// Clamp parameters to valid ranges
    pub fn clamp(&mut self) {
        let defaults = Self::default();
        let finite = |v: f32, d: f32| if v.is_finite() { v } else { d };
        self.strength = finite(self.strength, defaults.strength).clamp(0.0, 1.0);
        self.threshold_db = finite(self.threshold_db, defaults.threshold_db).clamp(-100.0, 0.0);
    }

    /// Cut in dB applied to band `index`
    pub fn band_cut_db(&self, index: usize) -> f32 {
        -self.strength * MAX_CUT_DB * BAND_WEIGHTS[index]
    }
}

/// Build the bank's stages in processing order: nine cuts, then the gate
pub fn noise_reduction_stages(
    params: &NoiseReductionParams,
    sample_rate: u32,
) -> Vec<Box<dyn Processor>> {
    let mut params = *params;
    params.clamp();

    let mut stages: Vec<Box<dyn Processor>> = BAND_CENTERS
        .iter()
        .enumerate()
        .map(|(i, &center)| {
            Box::new(Biquad::design(
                FilterType::Peaking,
                sample_rate,
                center,
                params.band_cut_db(i),
                BAND_Q,
            )) as Box<dyn Processor>
        })
        .collect();

    stages.push(Box::new(Gate::new(
        GateParams {
            threshold_db: params.threshold_db,
            ..GateParams::default()
        },
        sample_rate,
    )));
    stages
}
