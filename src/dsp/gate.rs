//! Downward gate
//!
//! Attenuates audio whose level stays below a threshold. An envelope follower
//! with hysteresis and a hold timer keeps the gate from chattering; the gain
//! itself is smoothed with attack/release coefficients to avoid clicks.

use serde::{Deserialize, Serialize};

use super::compressor::time_coefficient;
use super::effect::Processor;
use crate::engine::buffer::db_to_linear;
use crate::engine::AudioBuffer;

/// Gate state for the envelope follower
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Attack,
    Open,
    Hold,
    Release,
}

/// Gate parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateParams {
    /// Threshold in dB (-100 to 0)
    pub threshold_db: f32,
    /// Attack time in seconds
    pub attack: f32,
    /// Release time in seconds
    pub release: f32,
    /// Hold time in seconds
    pub hold: f32,
    /// Attenuation when closed in dB (-80 = full gate, 0 = no effect)
    pub range_db: f32,
}

impl Default for GateParams {
    fn default() -> Self {
        Self {
            threshold_db: -50.0,
            attack: 0.001,
            release: 0.1,
            hold: 0.02,
            range_db: -24.0,
        }
    }
}

impl GateParams {
    /// Clamp parameters to valid ranges
    pub fn clamp(&mut self) {
        self.threshold_db = self.threshold_db.clamp(-100.0, 0.0);
        self.attack = self.attack.clamp(0.0001, 0.05);
        self.release = self.release.clamp(0.01, 0.5);
        self.hold = self.hold.clamp(0.0, 0.1);
        self.range_db = self.range_db.clamp(-80.0, 0.0);
    }
}

/// Gate processing stage
#[derive(Debug, Clone)]
pub struct Gate {
    params: GateParams,
    state: GateState,
    envelope: f32,
    current_gain: f32,
    hold_counter: usize,
    attack_coeff: f32,
    release_coeff: f32,
    gate_attack_coeff: f32,
    gate_release_coeff: f32,
    hold_samples: usize,
    range_linear: f32,
    threshold_linear: f32,
    threshold_low_linear: f32,
}

/// Hysteresis between opening and closing thresholds
const HYSTERESIS_DB: f32 = 2.0;

impl Gate {
    pub fn new(mut params: GateParams, sample_rate: u32) -> Self {
        params.clamp();
        let range_linear = db_to_linear(params.range_db);
        Self {
            state: GateState::Closed,
            envelope: 0.0,
            current_gain: range_linear,
            hold_counter: 0,
            // Envelope detection is fast up, slower down
            attack_coeff: time_coefficient(0.0001, sample_rate),
            release_coeff: time_coefficient(0.05, sample_rate),
            gate_attack_coeff: time_coefficient(params.attack, sample_rate),
            gate_release_coeff: time_coefficient(params.release, sample_rate),
            hold_samples: (params.hold * sample_rate as f32) as usize,
            range_linear,
            threshold_linear: db_to_linear(params.threshold_db),
            threshold_low_linear: db_to_linear(params.threshold_db - HYSTERESIS_DB),
            params,
        }
    }

    pub fn params(&self) -> &GateParams {
        &self.params
    }

    /// Advance the detector by one sample and return the gain to apply
    fn process_sample(&mut self, input_level: f32) -> f32 {
        let coeff = if input_level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * input_level;

        let target_gain = match self.state {
            GateState::Closed => {
                if self.envelope > self.threshold_linear {
                    self.state = GateState::Attack;
                }
                self.range_linear
            }
            GateState::Attack => {
                if self.current_gain >= 0.99 {
                    self.state = GateState::Open;
                }
                1.0
            }
            GateState::Open => {
                if self.envelope < self.threshold_low_linear {
                    self.state = GateState::Hold;
                    self.hold_counter = self.hold_samples;
                }
                1.0
            }
            GateState::Hold => {
                if self.envelope > self.threshold_linear {
                    self.state = GateState::Open;
                } else if self.hold_counter > 0 {
                    self.hold_counter -= 1;
                } else {
                    self.state = GateState::Release;
                }
                1.0
            }
            GateState::Release => {
                if self.envelope > self.threshold_linear {
                    self.state = GateState::Attack;
                    1.0
                } else {
                    if self.current_gain <= self.range_linear + 0.001 {
                        self.state = GateState::Closed;
                    }
                    self.range_linear
                }
            }
        };

        let coeff = if target_gain > self.current_gain {
            self.gate_attack_coeff
        } else {
            self.gate_release_coeff
        };
        self.current_gain = coeff * self.current_gain + (1.0 - coeff) * target_gain;
        self.current_gain
    }
}

impl Processor for Gate {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let num_channels = buffer.num_channels();
        for frame in 0..buffer.num_frames() {
            let mut peak: f32 = 0.0;
            for ch in 0..num_channels {
                peak = peak.max(buffer.channel(ch)[frame].abs());
            }
            let gain = self.process_sample(peak);
            for ch in 0..num_channels {
                buffer.channel_mut(ch)[frame] *= gain;
            }
        }
    }

    fn reset(&mut self) {
        self.state = GateState::Closed;
        self.envelope = 0.0;
        self.current_gain = self.range_linear;
        self.hold_counter = 0;
    }

    fn kind(&self) -> &'static str {
        "gate"
    }
}
