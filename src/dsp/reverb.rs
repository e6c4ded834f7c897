//! Convolution reverb impulse responses
//!
//! Impulse responses are synthesized procedurally from `(room_size, damping)`:
//! stereo noise from a seeded generator, shaped by an exponential decay that
//! reaches -60 dB at the end of the response, darkened by a one-pole lowpass
//! whose strength follows `damping`. Responses are cached per rounded
//! parameter pair and sample rate and shared between chains.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::AudioBuffer;
use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Shortest response (room_size = 0) in seconds
const MIN_DURATION_SECS: f32 = 0.5;

/// Additional length at room_size = 1 in seconds
const ROOM_DURATION_SCALE: f32 = 3.5;

/// ln(1000): amplitude decay reaching -60 dB over the response
const DECAY_TO_MINUS_60_DB: f32 = 6.907_755;

/// Lowpass feedback at damping = 1
const MAX_DAMPING_POLE: f32 = 0.9;

const IR_CHANNELS: usize = 2;

const SEED_BASE: u64 = 0x5eed_0f_7e7b;

// ============================================================================
// Parameters
// ============================================================================

/// Reverb parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbParams {
    /// Room size: 0 (small) to 1 (huge hall)
    pub room_size: f32,
    /// Damping: 0 (bright) to 1 (dark)
    pub damping: f32,
    /// Wet level: 0 to 1; the dry level is `1 - wet`
    pub wet: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            wet: 0.3,
        }
    }
}

impl ReverbParams {
    /// Clamp parameters to valid ranges
    pub fn clamp(&mut self) {
        let defaults = Self::default();
        let finite = |v: f32, d: f32| if v.is_finite() { v } else { d };
        self.room_size = finite(self.room_size, defaults.room_size).clamp(0.0, 1.0);
        self.damping = finite(self.damping, defaults.damping).clamp(0.0, 1.0);
        self.wet = finite(self.wet, defaults.wet).clamp(0.0, 1.0);
    }

    pub fn dry(&self) -> f32 {
        1.0 - self.wet
    }
}

/// Impulse response length in seconds for a room size
pub fn impulse_duration(room_size: f32) -> f32 {
    MIN_DURATION_SECS + ROOM_DURATION_SCALE * room_size.clamp(0.0, 1.0)
}

/// Synthesize a stereo impulse response
///
/// The same inputs always produce the same samples. Each channel is
/// normalized to unit energy.
pub fn synthesize_impulse_response(
    room_size: f32,
    damping: f32,
    sample_rate: u32,
) -> Result<AudioBuffer> {
    let duration = impulse_duration(room_size);
    let length = ((duration * sample_rate as f32) as usize).max(1);
    let pole = damping.clamp(0.0, 1.0) * MAX_DAMPING_POLE;
    let key = IrKey::new(room_size, damping, sample_rate);

    let channels = (0..IR_CHANNELS)
        .map(|channel| {
            let mut rng = ChaCha8Rng::seed_from_u64(key.seed(channel));
            let mut lowpass = 0.0_f32;
            let mut samples: Vec<f32> = (0..length)
                .map(|i| {
                    let t = i as f32 / length as f32;
                    let envelope = (-DECAY_TO_MINUS_60_DB * t).exp();
                    let noise: f32 = rng.random_range(-1.0..1.0);
                    lowpass = (1.0 - pole) * noise + pole * lowpass;
                    lowpass * envelope
                })
                .collect();

            let energy: f32 = samples.iter().map(|s| s * s).sum();
            if energy > 0.0 {
                let scale = 1.0 / energy.sqrt();
                for s in &mut samples {
                    *s *= scale;
                }
            }
            samples
        })
        .collect();

    AudioBuffer::from_channels(channels, sample_rate)
}

// ============================================================================
// Cache
// ============================================================================

/// Parameters rounded to two decimals, plus the sample rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct IrKey {
    room_centi: u32,
    damping_centi: u32,
    sample_rate: u32,
}

impl IrKey {
    fn new(room_size: f32, damping: f32, sample_rate: u32) -> Self {
        Self {
            room_centi: (room_size.clamp(0.0, 1.0) * 100.0).round() as u32,
            damping_centi: (damping.clamp(0.0, 1.0) * 100.0).round() as u32,
            sample_rate,
        }
    }

    fn room_size(&self) -> f32 {
        self.room_centi as f32 / 100.0
    }

    fn damping(&self) -> f32 {
        self.damping_centi as f32 / 100.0
    }

    fn seed(&self, channel: usize) -> u64 {
        SEED_BASE
            ^ ((self.room_centi as u64) << 8)
            ^ ((self.damping_centi as u64) << 20)
            ^ ((channel as u64) << 40)
    }
}

/// Shared impulse-response cache keyed by rounded `(room_size, damping)`
#[derive(Debug, Default)]
pub struct ImpulseResponseCache {
    entries: Mutex<HashMap<IrKey, Arc<AudioBuffer>>>,
}

impl ImpulseResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached response for these parameters, synthesizing it on
    /// first use
    pub fn get_or_synthesize(
        &self,
        room_size: f32,
        damping: f32,
        sample_rate: u32,
    ) -> Result<Arc<AudioBuffer>> {
        let key = IrKey::new(room_size, damping, sample_rate);
        if let Some(hit) = self.lock().get(&key) {
            debug!(room = key.room_size(), damping = key.damping(), "impulse response cache hit");
            return Ok(Arc::clone(hit));
        }

        // Synthesis happens outside the lock; a concurrent miss only repeats
        // identical work.
        let impulse = Arc::new(synthesize_impulse_response(
            key.room_size(),
            key.damping(),
            sample_rate,
        )?);
        debug!(
            room = key.room_size(),
            damping = key.damping(),
            frames = impulse.num_frames(),
            "synthesized impulse response"
        );
        Ok(Arc::clone(
            self.lock().entry(key).or_insert(impulse),
        ))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<IrKey, Arc<AudioBuffer>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
