//! Presence detection
//!
//! Finds the time ranges during which a signal is active, measured as RMS
//! over fixed windows of a mono mixdown.

use serde::{Deserialize, Serialize};

use crate::engine::buffer::{db_to_linear, rms};
use crate::engine::AudioBuffer;

/// Default RMS window in seconds
pub const DEFAULT_PRESENCE_WINDOW: f64 = 0.05;

/// A time interval (seconds) during which a signal is present
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresenceRange {
    pub start: f64,
    pub end: f64,
}

impl PresenceRange {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Detect ranges whose windowed RMS exceeds `threshold_db`
///
/// Contiguous active windows merge into one range. The last window may be
/// shorter than `window_secs`; its range ends at the buffer end.
pub fn detect_presence(
    buffer: &AudioBuffer,
    threshold_db: f32,
    window_secs: f64,
) -> Vec<PresenceRange> {
    let sample_rate = buffer.sample_rate() as f64;
    let window = ((window_secs * sample_rate).round() as usize).max(1);
    let threshold = db_to_linear(threshold_db);
    let mono = buffer.to_mono();

    let mut ranges: Vec<PresenceRange> = Vec::new();
    let mut open: Option<f64> = None;

    for (i, chunk) in mono.chunks(window).enumerate() {
        let start = (i * window) as f64 / sample_rate;
        let active = rms(chunk) > threshold;
        match (active, open) {
            (true, None) => open = Some(start),
            (false, Some(s)) => {
                ranges.push(PresenceRange { start: s, end: start });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(s) = open {
        ranges.push(PresenceRange {
            start: s,
            end: mono.len() as f64 / sample_rate,
        });
    }
    ranges
}

/// Merge ranges separated by gaps no longer than `max_gap` seconds
pub fn merge_ranges(ranges: &[PresenceRange], max_gap: f64) -> Vec<PresenceRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<PresenceRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start - last.end <= max_gap => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn burst(sample_rate: u32, total: f64, on: &[(f64, f64)]) -> AudioBuffer {
        let frames = (total * sample_rate as f64) as usize;
        let samples = (0..frames)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                if on.iter().any(|&(s, e)| t >= s && t < e) {
                    0.5
                } else {
                    0.0
                }
            })
            .collect();
        AudioBuffer::mono(samples, sample_rate)
    }

    #[test]
    fn test_single_burst() {
        let buffer = burst(8000, 2.0, &[(0.5, 1.0)]);
        let ranges = detect_presence(&buffer, -40.0, DEFAULT_PRESENCE_WINDOW);
        assert_eq!(ranges.len(), 1);
        assert_abs_diff_eq!(ranges[0].start, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(ranges[0].end, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_trailing_presence_runs_to_end() {
        let buffer = burst(8000, 1.0, &[(0.7, 1.0)]);
        let ranges = detect_presence(&buffer, -40.0, DEFAULT_PRESENCE_WINDOW);
        assert_eq!(ranges.len(), 1);
        assert_abs_diff_eq!(ranges[0].end, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_silence_has_no_presence() {
        let buffer = AudioBuffer::new(2, 8000, 8000);
        assert!(detect_presence(&buffer, -60.0, DEFAULT_PRESENCE_WINDOW).is_empty());
    }

    #[test]
    fn test_merge_ranges_within_gap() {
        let ranges = [
            PresenceRange { start: 2.0, end: 3.0 },
            PresenceRange { start: 0.0, end: 1.0 },
            PresenceRange { start: 1.1, end: 1.5 },
        ];
        let merged = merge_ranges(&ranges, 0.2);
        assert_eq!(
            merged,
            vec![
                PresenceRange { start: 0.0, end: 1.5 },
                PresenceRange { start: 2.0, end: 3.0 },
            ]
        );
    }
}
