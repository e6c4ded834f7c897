//! Offline ducking
//!
//! Lowers a background track while the foreground is present. Presence is
//! measured as 50ms RMS windows; each merged presence range becomes four
//! keyframes (pre-attack, duck-in, duck-out, post-release).

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::curve::{apply_volume_automation, clamp_volume, VolumeKeyframe};
use crate::analysis::presence::{detect_presence, merge_ranges, DEFAULT_PRESENCE_WINDOW};
use crate::engine::buffer::db_to_linear;
use crate::engine::AudioBuffer;

/// A keyframe this close to the previous one is dropped
const DEDUP_WINDOW_SECS: f64 = 0.001;

/// Ducking parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckingParams {
    /// Foreground level (dB RMS) above which the background ducks
    pub threshold_db: f32,
    /// Attenuation applied to the background in dB (positive)
    pub reduction_db: f32,
    /// Seconds to reach the ducked level
    pub attack: f64,
    /// Seconds to return to the normal level
    pub release: f64,
    /// Presence ranges separated by less than this merge
    pub hold_time: f64,
}

impl Default for DuckingParams {
    fn default() -> Self {
        Self {
            threshold_db: -35.0,
            reduction_db: 12.0,
            attack: 0.05,
            release: 0.3,
            hold_time: 0.2,
        }
    }
}

impl DuckingParams {
    /// Background level while ducked, relative to `normal`
    pub fn ducked_level(&self, normal: f32) -> f32 {
        normal * db_to_linear(-self.reduction_db.max(0.0))
    }
}

/// Build the background volume keyframes for a foreground buffer
pub fn generate_ducking_keyframes(
    foreground: &AudioBuffer,
    params: &DuckingParams,
    base: f32,
) -> Vec<VolumeKeyframe> {
    let normal = clamp_volume(base);
    let ducked = params.ducked_level(normal);
    let attack = params.attack.max(0.0);
    let release = params.release.max(0.0);

    let presence = detect_presence(foreground, params.threshold_db, DEFAULT_PRESENCE_WINDOW);
    let ranges = merge_ranges(&presence, params.hold_time.max(0.0));

    let mut keyframes = Vec::with_capacity(ranges.len() * 4);
    for range in &ranges {
        keyframes.push(VolumeKeyframe::new(range.start - attack, normal));
        keyframes.push(VolumeKeyframe::new(range.start, ducked));
        keyframes.push(VolumeKeyframe::new(range.end, ducked));
        keyframes.push(VolumeKeyframe::new(range.end + release, normal));
    }

    let mut deduped: Vec<VolumeKeyframe> = Vec::with_capacity(keyframes.len());
    for keyframe in keyframes {
        let duplicate = deduped
            .last()
            .is_some_and(|last| (keyframe.time - last.time).abs() < DEDUP_WINDOW_SECS);
        if !duplicate {
            deduped.push(keyframe);
        }
    }
    debug!(
        ranges = ranges.len(),
        keyframes = deduped.len(),
        "generated ducking keyframes"
    );
    deduped
}

/// Duck `background` under `foreground` and return the processed copy
pub fn apply_ducking(
    background: &AudioBuffer,
    foreground: &AudioBuffer,
    params: &DuckingParams,
    base: f32,
) -> AudioBuffer {
    let keyframes = generate_ducking_keyframes(foreground, params, base);
    apply_volume_automation(background, &keyframes, base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn voice(sample_rate: u32, total: f64, on: (f64, f64)) -> AudioBuffer {
        let frames = (total * sample_rate as f64) as usize;
        let samples = (0..frames)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                if t >= on.0 && t < on.1 {
                    0.3 * (2.0 * std::f64::consts::PI * 220.0 * t).sin() as f32
                } else {
                    0.0
                }
            })
            .collect();
        AudioBuffer::mono(samples, sample_rate)
    }

    #[test]
    fn test_four_keyframes_per_range() {
        let fg = voice(8000, 4.0, (1.0, 2.0));
        let params = DuckingParams::default();
        let keyframes = generate_ducking_keyframes(&fg, &params, 1.0);
        assert_eq!(keyframes.len(), 4);

        let ducked = params.ducked_level(1.0);
        assert_abs_diff_eq!(keyframes[0].time, 0.95, epsilon = 1e-9);
        assert_eq!(keyframes[0].value, 1.0);
        assert_abs_diff_eq!(keyframes[1].time, 1.0, epsilon = 1e-9);
        assert_eq!(keyframes[1].value, ducked);
        assert_abs_diff_eq!(keyframes[2].time, 2.0, epsilon = 1e-9);
        assert_eq!(keyframes[2].value, ducked);
        assert_abs_diff_eq!(keyframes[3].time, 2.3, epsilon = 1e-9);
        assert_eq!(keyframes[3].value, 1.0);
    }

    #[test]
    fn test_ducked_level_matches_reduction() {
        let params = DuckingParams {
            reduction_db: 20.0,
            ..DuckingParams::default()
        };
        assert_abs_diff_eq!(params.ducked_level(1.0), 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(params.ducked_level(0.5), 0.05, epsilon = 1e-6);
    }

    #[test]
    fn test_equal_times_keep_first_keyframe() {
        let params = DuckingParams {
            attack: 0.0,
            ..DuckingParams::default()
        };
        let keyframes = generate_ducking_keyframes(&voice(8000, 2.0, (0.5, 1.0)), &params, 1.0);
        assert_eq!(keyframes.len(), 3);
        assert_abs_diff_eq!(keyframes[0].time, 0.5, epsilon = 1e-9);
        assert_eq!(keyframes[0].value, 1.0);
        assert_eq!(keyframes[1].value, params.ducked_level(1.0));
    }

    #[test]
    fn test_pre_attack_may_start_before_zero() {
        let keyframes =
            generate_ducking_keyframes(&voice(8000, 2.0, (0.0, 1.0)), &DuckingParams::default(), 1.0);
        assert_eq!(keyframes.len(), 4);
        assert_abs_diff_eq!(keyframes[0].time, -0.05, epsilon = 1e-9);
        assert_eq!(keyframes[1].time, 0.0);
    }

    fn two_bursts(sample_rate: u32, first: (f64, f64), second: (f64, f64)) -> AudioBuffer {
        let mut fg = voice(sample_rate, 4.0, first);
        fg.add_from(&voice(sample_rate, 4.0, second));
        fg
    }

    #[test]
    fn test_ranges_apart_by_more_than_hold_duck_separately() {
        let params = DuckingParams::default();
        let fg = two_bursts(8000, (1.0, 1.5), (2.0, 2.5));
        let keyframes = generate_ducking_keyframes(&fg, &params, 1.0);
        let times: Vec<f64> = keyframes.iter().map(|k| (k.time * 1000.0).round() / 1000.0).collect();
        assert_eq!(times, vec![0.95, 1.0, 1.5, 1.8, 1.95, 2.0, 2.5, 2.8]);
    }

    #[test]
    fn test_release_overlapping_next_attack_keeps_both_ducks() {
        let params = DuckingParams::default();
        // Gap of 0.3s is longer than the hold but shorter than attack + release
        let fg = two_bursts(8000, (1.0, 1.5), (1.8, 2.3));
        let keyframes = generate_ducking_keyframes(&fg, &params, 1.0);
        assert_eq!(keyframes.len(), 8);
    }

    #[test]
    fn test_ranges_within_hold_merge() {
        let params = DuckingParams::default();
        let fg = two_bursts(8000, (1.0, 1.5), (1.6, 2.0));
        let keyframes = generate_ducking_keyframes(&fg, &params, 1.0);
        assert_eq!(keyframes.len(), 4);
        assert_abs_diff_eq!(keyframes[2].time, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_silent_foreground_leaves_background() {
        let bg = AudioBuffer::mono(vec![0.5; 8000], 8000);
        let fg = AudioBuffer::new(1, 8000, 8000);
        let out = apply_ducking(&bg, &fg, &DuckingParams::default(), 1.0);
        assert_eq!(out, bg);
    }

    #[test]
    fn test_background_ducks_under_voice() {
        let sr = 8000;
        let bg = AudioBuffer::mono(vec![0.5; 4 * sr as usize], sr);
        let fg = voice(sr, 4.0, (1.0, 2.0));
        let params = DuckingParams::default();
        let out = apply_ducking(&bg, &fg, &params, 1.0);
        let ch = out.channel(0);
        assert_eq!(ch[4000], 0.5);
        assert_abs_diff_eq!(ch[12000], 0.5 * params.ducked_level(1.0), epsilon = 1e-6);
        assert_eq!(ch[3 * sr as usize], 0.5);
    }

    #[test]
    fn test_params_from_partial_json() {
        let params: DuckingParams = serde_json::from_str(r#"{"reduction_db": 6.0}"#).unwrap();
        assert_eq!(params.reduction_db, 6.0);
        assert_eq!(params.threshold_db, -35.0);
    }
}
