//! Feedback delay
//!
//! A circular delay line per channel. The delayed signal is fed back into the
//! line scaled by `feedback` and mixed with the dry signal by `mix`.

use serde::{Deserialize, Serialize};

use super::effect::Processor;
use crate::engine::AudioBuffer;

/// Delay parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayParams {
    /// Delay time in seconds (0 to 5)
    pub time: f32,
    /// Feedback amount (0 to 0.95, never 1.0 to keep the loop stable)
    pub feedback: f32,
    /// Wet/dry mix (0 = dry only, 1 = wet only)
    pub mix: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            time: 0.3,
            feedback: 0.3,
            mix: 0.5,
        }
    }
}

impl DelayParams {
    /// Clamp parameters to valid ranges
    pub fn clamp(&mut self) {
        let defaults = Self::default();
        let finite = |v: f32, d: f32| if v.is_finite() { v } else { d };
        self.time = finite(self.time, defaults.time).clamp(0.0, 5.0);
        self.feedback = finite(self.feedback, defaults.feedback).clamp(0.0, 0.95);
        self.mix = finite(self.mix, defaults.mix).clamp(0.0, 1.0);
    }
}

/// Delay processing stage
#[derive(Debug, Clone)]
pub struct Delay {
    params: DelayParams,
    delay_samples: usize,
    lines: Vec<Vec<f32>>,
    write_pos: usize,
}

impl Delay {
    /// Create a delay; parameters are clamped
    pub fn new(mut params: DelayParams, sample_rate: u32) -> Self {
        params.clamp();
        let delay_samples = ((params.time * sample_rate as f32).round() as usize).max(1);
        Self {
            params,
            delay_samples,
            lines: Vec::new(),
            write_pos: 0,
        }
    }

    pub fn params(&self) -> &DelayParams {
        &self.params
    }

    /// Delay length in samples
    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    fn ensure_lines(&mut self, num_channels: usize) {
        if self.lines.len() < num_channels {
            self.lines
                .resize_with(num_channels, || vec![0.0; self.delay_samples]);
        }
    }
}

impl Processor for Delay {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        self.ensure_lines(buffer.num_channels());
        let size = self.delay_samples;
        let feedback = self.params.feedback;
        let wet = self.params.mix;
        let dry = 1.0 - wet;
        let start = self.write_pos;

        for (channel, line) in buffer.channels_mut().zip(self.lines.iter_mut()) {
            // The line holds exactly `size` samples, so the slot about to be
            // written is the one written `size` samples ago.
            let mut pos = start;
            for sample in channel.iter_mut() {
                let input = *sample;
                let delayed = line[pos];
                line[pos] = input + delayed * feedback;
                *sample = input * dry + delayed * wet;
                pos += 1;
                if pos == size {
                    pos = 0;
                }
            }
        }
        self.write_pos = (start + buffer.num_frames()) % size;
    }

    fn reset(&mut self) {
        self.lines.clear();
        self.write_pos = 0;
    }

    fn kind(&self) -> &'static str {
        "delay"
    }
}
