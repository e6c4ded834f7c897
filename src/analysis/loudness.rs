//! Silence detection and loudness measurement

use serde::{Deserialize, Serialize};

use crate::engine::buffer::{calculate_peak, calculate_rms, db_to_linear};
use crate::engine::AudioBuffer;

/// Silence is judged over windows of this length
const SILENCE_WINDOW_SECS: f64 = 0.1;

/// Offset from RMS dB to the approximate LUFS figure
const LUFS_OFFSET_DB: f32 = 0.691;

/// A silent interval in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceRange {
    pub start: f64,
    pub end: f64,
}

/// Level summary of a buffer
///
/// `lufs` is an approximation (`rms_db - 0.691`) and applies no K-weighting
/// or gating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessMeasurement {
    pub rms_db: f32,
    pub peak_db: f32,
    pub lufs: f32,
}

/// Find silent ranges: 100ms windows whose peak stays below `threshold_db`
///
/// Peak is taken across all channels. A silent run that reaches the end of
/// the buffer is closed at the buffer end.
pub fn detect_silence(buffer: &AudioBuffer, threshold_db: f32) -> Vec<SilenceRange> {
    let sample_rate = buffer.sample_rate() as f64;
    let frames = buffer.num_frames();
    let window = ((SILENCE_WINDOW_SECS * sample_rate).round() as usize).max(1);
    let threshold = db_to_linear(threshold_db);

    let mut ranges = Vec::new();
    let mut open: Option<f64> = None;
    let mut start = 0;
    while start < frames {
        let end = (start + window).min(frames);
        let peak = buffer
            .channels()
            .map(|ch| crate::engine::buffer::peak(&ch[start..end]))
            .fold(0.0_f32, f32::max);
        let at = start as f64 / sample_rate;

        if peak < threshold {
            open.get_or_insert(at);
        } else if let Some(s) = open.take() {
            ranges.push(SilenceRange { start: s, end: at });
        }
        start = end;
    }
    if let Some(s) = open {
        ranges.push(SilenceRange {
            start: s,
            end: frames as f64 / sample_rate,
        });
    }
    ranges
}

/// Measure RMS and peak level in dB plus approximate LUFS
pub fn measure_loudness(buffer: &AudioBuffer) -> LoudnessMeasurement {
    let rms_db = calculate_rms(buffer);
    LoudnessMeasurement {
        rms_db,
        peak_db: calculate_peak(buffer),
        lufs: rms_db - LUFS_OFFSET_DB,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_gap_in_tone_is_one_silent_range() {
        let sr = 44100;
        let samples: Vec<f32> = (0..3 * sr as usize)
            .map(|i| {
                let t = i as f64 / sr as f64;
                if (1.0..2.0).contains(&t) {
                    0.0
                } else {
                    0.5 * (2.0 * std::f64::consts::PI * 440.0 * t).sin() as f32
                }
            })
            .collect();
        let ranges = detect_silence(&AudioBuffer::mono(samples, sr), -50.0);
        assert_eq!(ranges.len(), 1);
        assert_abs_diff_eq!(ranges[0].start, 1.0, epsilon = 0.01);
        assert_abs_diff_eq!(ranges[0].end, 2.0, epsilon = 0.01);
    }

    #[test]
    fn test_trailing_silence_extends_to_end() {
        let sr = 8000;
        let mut samples = vec![0.3_f32; sr as usize];
        samples.extend(vec![0.0; 4000]);
        let ranges = detect_silence(&AudioBuffer::mono(samples, sr), -40.0);
        assert_eq!(ranges, vec![SilenceRange { start: 1.0, end: 1.5 }]);
    }

    #[test]
    fn test_loud_buffer_has_no_silence() {
        let buffer = AudioBuffer::mono(vec![0.5; 8000], 8000);
        assert!(detect_silence(&buffer, -40.0).is_empty());
    }

    #[test]
    fn test_loudness_of_constant_signal() {
        let buffer = AudioBuffer::mono(vec![0.5; 4800], 48000);
        let m = measure_loudness(&buffer);
        assert_abs_diff_eq!(m.rms_db, -6.0206, epsilon = 1e-3);
        assert_abs_diff_eq!(m.peak_db, -6.0206, epsilon = 1e-3);
        assert_abs_diff_eq!(m.lufs, m.rms_db - 0.691, epsilon = 1e-6);
    }

    #[test]
    fn test_loudness_of_silence_is_negative_infinity() {
        let m = measure_loudness(&AudioBuffer::new(2, 100, 48000));
        assert_eq!(m.rms_db, f32::NEG_INFINITY);
        assert_eq!(m.lufs, f32::NEG_INFINITY);
    }
}
