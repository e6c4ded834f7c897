//! Gain stage and stereo panning
//!
//! Pan follows the equal-power stereo panner law: mono input is spread across
//! both outputs, stereo input folds the attenuated side into the other one.

use std::f32::consts::FRAC_PI_2;

use super::effect::Processor;
use crate::engine::AudioBuffer;

/// Scalar gain stage (linear)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain {
    gain: f32,
}

impl Gain {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

}

impl Default for Gain {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Processor for Gain {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if (self.gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        buffer.apply_gain_linear(self.gain);
    }

    fn reset(&mut self) {}

    fn kind(&self) -> &'static str {
        "gain"
    }
}

/// Left/right gains for a position in [-1, 1]
#[inline]
fn pan_gains(x: f32) -> (f32, f32) {
    ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin())
}

/// Apply equal-power panning, returning a stereo buffer
///
/// Mono sources are spread with `x = (pan + 1) / 2`. Stereo (and wider)
/// sources use their first two channels: panning left folds the right
/// channel into the left, panning right folds the left into the right.
pub fn pan_buffer(buffer: &AudioBuffer, pan: f32) -> AudioBuffer {
    let pan = if pan.is_finite() { pan.clamp(-1.0, 1.0) } else { 0.0 };
    let frames = buffer.num_frames();
    let mut left = vec![0.0; frames];
    let mut right = vec![0.0; frames];

    if buffer.num_channels() == 1 {
        let (gl, gr) = pan_gains((pan + 1.0) / 2.0);
        for (i, &s) in buffer.channel(0).iter().enumerate() {
            left[i] = s * gl;
            right[i] = s * gr;
        }
    } else {
        let in_l = buffer.channel(0);
        let in_r = buffer.channel(1);
        if pan <= 0.0 {
            let (gl, gr) = pan_gains(pan + 1.0);
            for i in 0..frames {
                left[i] = in_l[i] + in_r[i] * gl;
                right[i] = in_r[i] * gr;
            }
        } else {
            let (gl, gr) = pan_gains(pan);
            for i in 0..frames {
                left[i] = in_l[i] * gl;
                right[i] = in_r[i] + in_l[i] * gr;
            }
        }
    }

    AudioBuffer::from_channels(vec![left, right], buffer.sample_rate())
        .unwrap_or_else(|_| AudioBuffer::new(2, frames, buffer.sample_rate()))
}
