//! Fade in / fade out
//!
//! Fades are volume automation with two keyframes at each end of the buffer.
//! When the requested fades overlap they are shortened proportionally so the
//! fade-out never starts before the fade-in finishes.

use super::curve::{apply_volume_automation, CurveType, VolumeKeyframe};
use crate::engine::AudioBuffer;

pub(crate) fn fit_fades(total: f64, fade_in: f64, fade_out: f64) -> (f64, f64) {
    let fade_in = fade_in.max(0.0);
    let fade_out = fade_out.max(0.0);
    let sum = fade_in + fade_out;
    if sum > total && sum > 0.0 {
        let scale = total / sum;
        (fade_in * scale, fade_out * scale)
    } else {
        (fade_in, fade_out)
    }
}

fn fade_keyframes(
    total: f64,
    fade_in: f64,
    fade_out: f64,
    curve: CurveType,
) -> Vec<VolumeKeyframe> {
    let (fade_in, fade_out) = fit_fades(total, fade_in, fade_out);
    let mut keyframes = Vec::with_capacity(4);
    if fade_in > 0.0 {
        keyframes.push(VolumeKeyframe::new(0.0, 0.0).with_curve(curve));
        keyframes.push(VolumeKeyframe::new(fade_in, 1.0).with_curve(curve));
    }
    if fade_out > 0.0 {
        keyframes.push(VolumeKeyframe::new(total - fade_out, 1.0).with_curve(curve));
        keyframes.push(VolumeKeyframe::new(total, 0.0));
    }
    keyframes
}

/// Fade from silence over the first `duration` seconds
pub fn apply_fade_in(buffer: &AudioBuffer, duration: f64, curve: CurveType) -> AudioBuffer {
    apply_fades(buffer, duration, 0.0, curve)
}

/// Fade to silence over the last `duration` seconds
pub fn apply_fade_out(buffer: &AudioBuffer, duration: f64, curve: CurveType) -> AudioBuffer {
    apply_fades(buffer, 0.0, duration, curve)
}

/// Apply both fades in one pass
pub fn apply_fades(
    buffer: &AudioBuffer,
    fade_in: f64,
    fade_out: f64,
    curve: CurveType,
) -> AudioBuffer {
    // The last frame sits one sample before the buffer's end
    let total = buffer.num_frames().saturating_sub(1) as f64 / buffer.sample_rate() as f64;
    let keyframes = fade_keyframes(total, fade_in, fade_out, curve);
    apply_volume_automation(buffer, &keyframes, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ones(frames: usize) -> AudioBuffer {
        AudioBuffer::from_channels(vec![vec![1.0; frames]; 2], 1000).unwrap()
    }

    #[test]
    fn test_fade_in_starts_silent() {
        let out = apply_fade_in(&ones(1001), 0.5, CurveType::Linear);
        for ch in out.channels() {
            assert_eq!(ch[0], 0.0);
            assert_abs_diff_eq!(ch[250], 0.5, epsilon = 1e-6);
            assert_eq!(ch[500], 1.0);
            assert_eq!(ch[1000], 1.0);
        }
    }

    #[test]
    fn test_fade_out_ends_silent() {
        let out = apply_fade_out(&ones(1001), 0.2, CurveType::Linear);
        let ch = out.channel(0);
        assert_eq!(ch[0], 1.0);
        assert_eq!(ch[700], 1.0);
        assert!(ch[900] > 0.0 && ch[900] < 1.0);
        assert_eq!(ch[1000], 0.0);
    }

    #[test]
    fn test_overlapping_fades_are_shortened() {
        assert_eq!(fit_fades(1.0, 0.75, 0.75), (0.5, 0.5));
        let out = apply_fades(&ones(1001), 3.0, 1.0, CurveType::SCurve);
        let ch = out.channel(0);
        assert_eq!(ch[0], 0.0);
        assert_eq!(ch[750], 1.0);
        assert_eq!(ch[1000], 0.0);
    }

    #[test]
    fn test_zero_length_fades_are_identity() {
        let buffer = ones(10);
        assert_eq!(apply_fades(&buffer, 0.0, 0.0, CurveType::Linear), buffer);
    }
}
