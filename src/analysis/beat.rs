//! Beat, onset and tempo detection
//!
//! Works in the energy domain: frame energy, half-wave rectified energy
//! difference as onset strength, an adaptive local-mean threshold for onset
//! picking, and an inter-onset-interval histogram for tempo. The beat grid is
//! anchored on the strongest onset and downbeats are placed on the bar offset
//! with the most onset energy.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::io::decode_wav;
use crate::engine::AudioBuffer;
use crate::error::Result;

/// Absolute floor added to the adaptive threshold (normalized strength)
const THRESHOLD_FLOOR: f32 = 0.05;

/// Relative tolerance when matching an interval to the beat period
const INTERVAL_TOLERANCE: f64 = 0.08;

/// Onsets up to this many positions apart vote in the tempo histogram
const MAX_INTERVAL_SPAN: usize = 4;

/// Window for attaching onset strength to grid beats
const BEAT_MATCH_WINDOW_SECS: f64 = 0.07;

/// Beat detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Energy frame length in samples
    pub window_size: usize,
    /// Hop between frames in samples
    pub hop_size: usize,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Half-width of the local-mean threshold window in seconds
    pub threshold_window: f64,
    pub threshold_multiplier: f32,
    /// Minimum spacing between onsets in seconds
    pub min_onset_interval: f64,
    pub beats_per_bar: usize,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            window_size: 1024,
            hop_size: 256,
            min_bpm: 60.0,
            max_bpm: 200.0,
            threshold_window: 0.25,
            threshold_multiplier: 1.5,
            min_onset_interval: 0.1,
            beats_per_bar: 4,
        }
    }
}

/// A detected onset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Onset {
    /// Time in seconds
    pub time: f64,
    /// Normalized onset strength (0 to 1)
    pub strength: f32,
}

/// One beat of the grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub time: f64,
    /// Strength of the onset matching this beat, 0 when none does
    pub strength: f32,
    pub index: usize,
}

/// Tempo and beat grid for a buffer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BeatAnalysisResult {
    /// Tempo in beats per minute; 0 when no tempo was found
    pub bpm: f64,
    /// Share of onset intervals consistent with the tempo (0 to 1)
    pub confidence: f64,
    pub beats: Vec<Beat>,
    /// Times of the first beat of each bar
    pub downbeats: Vec<f64>,
}

// ============================================================================
// Onsets
// ============================================================================

/// Normalized onset-strength envelope, one value per frame
pub fn onset_strength(samples: &[f32], config: &BeatConfig) -> Vec<f32> {
    let window = config.window_size.max(1);
    let hop = config.hop_size.max(1);
    let frames = if samples.len() > window {
        (samples.len() - window) / hop + 1
    } else {
        1
    };

    let mut previous = 0.0_f32;
    let mut strength: Vec<f32> = (0..frames)
        .map(|f| {
            let start = f * hop;
            let end = (start + window).min(samples.len());
            let energy = samples[start.min(end)..end].iter().map(|s| s * s).sum::<f32>()
                / window as f32;
            let rise = (energy - previous).max(0.0);
            previous = energy;
            rise
        })
        .collect();

    let max = strength.iter().copied().fold(0.0_f32, f32::max);
    if max > 0.0 {
        for s in &mut strength {
            *s /= max;
        }
    }
    strength
}

/// Pick onsets from a mono signal
pub fn detect_onsets(samples: &[f32], sample_rate: u32, config: &BeatConfig) -> Vec<Onset> {
    let strength = onset_strength(samples, config);
    let hop = config.hop_size.max(1);
    let window = config.window_size.max(1);
    let frame_rate = sample_rate as f64 / hop as f64;
    let half = (config.threshold_window * frame_rate).round() as usize;

    // Prefix sums for the sliding local mean
    let mut prefix = Vec::with_capacity(strength.len() + 1);
    prefix.push(0.0_f64);
    for &s in &strength {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + s as f64);
    }

    // A frame's rise comes from the hop of samples that just entered it
    let frame_time = |f: usize| -> f64 {
        if f == 0 {
            0.0
        } else {
            (f * hop + window - hop) as f64 / sample_rate as f64
        }
    };

    let mut onsets: Vec<Onset> = Vec::new();
    for f in 0..strength.len() {
        let s = strength[f];
        if s <= 0.0 {
            continue;
        }
        let prev = if f > 0 { strength[f - 1] } else { 0.0 };
        let next = strength.get(f + 1).copied().unwrap_or(0.0);
        if s <= prev || s < next {
            continue;
        }

        let lo = f.saturating_sub(half);
        let hi = (f + half + 1).min(strength.len());
        let local_mean = ((prefix[hi] - prefix[lo]) / (hi - lo) as f64) as f32;
        if s <= local_mean * config.threshold_multiplier + THRESHOLD_FLOOR {
            continue;
        }

        let time = frame_time(f);
        match onsets.last_mut() {
            Some(last) if time - last.time < config.min_onset_interval => {
                if s > last.strength {
                    *last = Onset { time, strength: s };
                }
            }
            _ => onsets.push(Onset { time, strength: s }),
        }
    }
    onsets
}

// ============================================================================
// Tempo
// ============================================================================

fn fold_bpm(mut bpm: f64, min_bpm: f64, max_bpm: f64) -> f64 {
    if !(bpm.is_finite() && bpm > 0.0) {
        return 0.0;
    }
    while bpm < min_bpm {
        bpm *= 2.0;
    }
    while bpm >= max_bpm {
        bpm /= 2.0;
    }
    bpm
}

/// Multiple of `period` that `interval` matches within tolerance
fn matching_multiple(interval: f64, period: f64) -> Option<f64> {
    let multiple = (interval / period).round();
    if multiple < 1.0 {
        return None;
    }
    ((interval - multiple * period).abs() <= INTERVAL_TOLERANCE * multiple * period)
        .then_some(multiple)
}

/// Estimate tempo from onset times; returns `(bpm, confidence)`
fn estimate_tempo(onsets: &[Onset], config: &BeatConfig) -> (f64, f64) {
    if onsets.len() < 2 {
        return (0.0, 0.0);
    }
    let min_bpm = config.min_bpm.max(1.0);
    let max_bpm = config.max_bpm.max(min_bpm * 2.0);
    let bins = (max_bpm - min_bpm).ceil() as usize;
    let mut histogram = vec![0.0_f64; bins.max(1)];

    for i in 0..onsets.len() {
        for span in 1..=MAX_INTERVAL_SPAN {
            let Some(later) = onsets.get(i + span) else {
                break;
            };
            let interval = later.time - onsets[i].time;
            let bpm = fold_bpm(60.0 / interval, min_bpm, max_bpm);
            if bpm <= 0.0 {
                continue;
            }
            let bin = ((bpm - min_bpm) as usize).min(histogram.len() - 1);
            histogram[bin] += 1.0 / span as f64;
        }
    }

    let best = histogram
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0;
    let period = 60.0 / (min_bpm + best as f64 + 0.5);

    let intervals: Vec<f64> = onsets.windows(2).map(|w| w[1].time - w[0].time).collect();
    let consistent: Vec<f64> = intervals
        .iter()
        .filter_map(|&d| matching_multiple(d, period).map(|m| d / m))
        .collect();
    if consistent.is_empty() {
        return (fold_bpm(60.0 / period, min_bpm, max_bpm), 0.0);
    }

    let refined = consistent.iter().sum::<f64>() / consistent.len() as f64;
    let confidence = consistent.len() as f64 / intervals.len() as f64;
    (fold_bpm(60.0 / refined, min_bpm, max_bpm), confidence.clamp(0.0, 1.0))
}

// ============================================================================
// Grid
// ============================================================================

fn build_grid(onsets: &[Onset], bpm: f64, duration: f64) -> Vec<Beat> {
    let period = 60.0 / bpm;
    let anchor = onsets
        .iter()
        .fold(None::<&Onset>, |best, o| match best {
            Some(b) if b.strength >= o.strength => Some(b),
            _ => Some(o),
        })
        .map(|o| o.time)
        .unwrap_or(0.0);
    let phase = anchor.rem_euclid(period);

    let mut beats = Vec::new();
    let mut time = phase;
    while time < duration {
        let strength = onsets
            .iter()
            .filter(|o| (o.time - time).abs() <= BEAT_MATCH_WINDOW_SECS)
            .min_by(|a, b| {
                (a.time - time)
                    .abs()
                    .total_cmp(&(b.time - time).abs())
            })
            .map(|o| o.strength)
            .unwrap_or(0.0);
        beats.push(Beat {
            time,
            strength,
            index: beats.len(),
        });
        time = phase + beats.len() as f64 * period;
    }
    beats
}

fn pick_downbeats(beats: &[Beat], beats_per_bar: usize) -> Vec<f64> {
    let bar = beats_per_bar.max(1);
    let offset = (0..bar.min(beats.len()))
        .map(|offset| {
            let sum: f32 = beats.iter().skip(offset).step_by(bar).map(|b| b.strength).sum();
            (offset, sum)
        })
        .fold((0, f32::MIN), |best, (o, s)| if s > best.1 { (o, s) } else { best })
        .0;
    beats.iter().skip(offset).step_by(bar).map(|b| b.time).collect()
}

// ============================================================================
// Entry points
// ============================================================================

/// Analyze tempo and beats of a buffer (channels are mixed to mono)
pub fn analyze_audio_buffer(buffer: &AudioBuffer, config: &BeatConfig) -> BeatAnalysisResult {
    let mono = buffer.to_mono();
    let onsets = detect_onsets(&mono, buffer.sample_rate(), config);
    let (bpm, confidence) = estimate_tempo(&onsets, config);
    debug!(onsets = onsets.len(), bpm, confidence, "beat analysis");

    if bpm <= 0.0 {
        return BeatAnalysisResult::default();
    }
    let beats = build_grid(&onsets, bpm, buffer.duration_secs());
    let downbeats = pick_downbeats(&beats, config.beats_per_bar);
    BeatAnalysisResult {
        bpm,
        confidence,
        beats,
        downbeats,
    }
}

/// Analyze WAV bytes; undecodable input fails with `Decode`
pub fn analyze_from_blob(bytes: &[u8], config: &BeatConfig) -> Result<BeatAnalysisResult> {
    let buffer = decode_wav(bytes, "blob")?;
    Ok(analyze_audio_buffer(&buffer, config))
}

/// Fetch a WAV over HTTP and analyze it
///
/// A 404 fails with `NotFound`; other transport or status failures surface
/// as `Decode` for the URL.
#[cfg(feature = "remote")]
pub fn analyze_from_url(url: &str, config: &BeatConfig) -> Result<BeatAnalysisResult> {
    use crate::error::SpliceError;

    let fetch_error = |reason: String| SpliceError::Decode {
        media_id: url.to_string(),
        reason,
    };
    let response = reqwest::blocking::get(url).map_err(|e| fetch_error(e.to_string()))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(SpliceError::not_found("audio url", url));
    }
    if !response.status().is_success() {
        return Err(fetch_error(format!("HTTP {}", response.status())));
    }
    let bytes = response.bytes().map_err(|e| fetch_error(e.to_string()))?;
    let buffer = decode_wav(&bytes, url)?;
    Ok(analyze_audio_buffer(&buffer, config))
}
