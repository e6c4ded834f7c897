//! Real-time mixing graph
//!
//! One processor per track: input → effect chain → gain → pan → master.
//! Audibility is recomputed from mute/solo state on every change; an
//! inaudible track keeps its configured volume and only its effective gain
//! drops to zero, so unmuting restores the exact prior level.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::timeline::{is_audible, TrackAudioState};
use crate::automation::curve::clamp_volume;
use crate::dsp::chain::{build_chain, ChainGraph};
use crate::dsp::effect::Effect;
use crate::dsp::gain::pan_buffer;
use crate::dsp::reverb::ImpulseResponseCache;
use crate::engine::AudioBuffer;
use crate::error::{Result, SpliceError};

/// Settings for creating a track processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackProcessorConfig {
    pub track_id: String,
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub effects: Vec<Effect>,
}

impl Default for TrackProcessorConfig {
    fn default() -> Self {
        Self {
            track_id: String::new(),
            volume: 1.0,
            pan: 0.0,
            muted: false,
            solo: false,
            effects: Vec::new(),
        }
    }
}

impl TrackProcessorConfig {
    pub fn new(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            ..Self::default()
        }
    }

    /// Config mirroring a timeline track's state
    pub fn from_state(track_id: impl Into<String>, state: &TrackAudioState) -> Self {
        Self {
            track_id: track_id.into(),
            volume: state.volume,
            pan: state.pan,
            muted: state.muted,
            solo: state.solo,
            effects: state.effects.clone(),
        }
    }
}

fn clamp_pan(pan: f32) -> f32 {
    if pan.is_finite() {
        pan.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Live per-track processing state
pub struct TrackProcessor {
    track_id: String,
    volume: f32,
    pan: f32,
    muted: bool,
    solo: bool,
    audible: bool,
    effects: Vec<Effect>,
    chain: ChainGraph,
}

impl TrackProcessor {
    fn new(config: TrackProcessorConfig, chain: ChainGraph) -> Self {
        Self {
            track_id: config.track_id,
            volume: clamp_volume(config.volume),
            pan: clamp_pan(config.pan),
            muted: config.muted,
            solo: config.solo,
            audible: !config.muted,
            effects: config.effects,
            chain,
        }
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// Configured volume, kept while the track is inaudible
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_solo(&self) -> bool {
        self.solo
    }

    pub fn is_audible(&self) -> bool {
        self.audible
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn chain(&self) -> &ChainGraph {
        &self.chain
    }

    /// Gain actually applied: the volume when audible, otherwise zero
    pub fn effective_gain(&self) -> f32 {
        if self.audible {
            self.volume
        } else {
            0.0
        }
    }

    fn apply_audibility(&mut self, any_solo: bool) {
        self.audible = is_audible(self.muted, self.solo, any_solo);
    }

    fn process(&mut self, input: &AudioBuffer, channels: usize) -> AudioBuffer {
        let mut out = self.chain.process(input).with_channel_count(2);
        out.apply_gain_linear(self.effective_gain());
        if self.pan != 0.0 {
            out = pan_buffer(&out, self.pan);
        }
        if channels == 2 {
            out
        } else if channels == 1 {
            AudioBuffer::mono(out.to_mono(), out.sample_rate())
        } else {
            out.with_channel_count(channels)
        }
    }
}

/// Per-track processors feeding one master bus
pub struct MixingGraph {
    sample_rate: u32,
    channels: usize,
    processors: BTreeMap<String, TrackProcessor>,
    any_solo: bool,
}

impl MixingGraph {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            processors: BTreeMap::new(),
            any_solo: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn has_solo_tracks(&self) -> bool {
        self.any_solo
    }

    pub fn processor(&self, track_id: &str) -> Option<&TrackProcessor> {
        self.processors.get(track_id)
    }

    /// Create the processor for a track, replacing any existing one
    pub fn create_track_processor(
        &mut self,
        config: TrackProcessorConfig,
        ir_cache: &ImpulseResponseCache,
    ) -> Result<()> {
        let chain = build_chain(&config.effects, self.sample_rate, ir_cache)?;
        let track_id = config.track_id.clone();
        if self.processors.remove(&track_id).is_some() {
            debug!(track = %track_id, "disposed previous track processor");
        }
        self.processors
            .insert(track_id.clone(), TrackProcessor::new(config, chain));
        debug!(track = %track_id, "created track processor");
        self.update_solo_state();
        Ok(())
    }

    /// Remove a track's processor; returns whether one existed
    pub fn remove_track_processor(&mut self, track_id: &str) -> bool {
        let removed = self.processors.remove(track_id).is_some();
        if removed {
            self.update_solo_state();
        }
        removed
    }

    pub fn set_track_muted(&mut self, track_id: &str, muted: bool) -> Result<()> {
        let any_solo = self.any_solo;
        let processor = self.processor_mut(track_id)?;
        processor.muted = muted;
        processor.apply_audibility(any_solo);
        Ok(())
    }

    pub fn set_track_solo(&mut self, track_id: &str, solo: bool) -> Result<()> {
        self.processor_mut(track_id)?.solo = solo;
        self.update_solo_state();
        Ok(())
    }

    pub fn set_track_volume(&mut self, track_id: &str, volume: f32) -> Result<()> {
        self.processor_mut(track_id)?.volume = clamp_volume(volume);
        Ok(())
    }

    pub fn set_track_pan(&mut self, track_id: &str, pan: f32) -> Result<()> {
        self.processor_mut(track_id)?.pan = clamp_pan(pan);
        Ok(())
    }

    /// Replace a track's effects, rebuilding its chain
    pub fn set_track_effects(
        &mut self,
        track_id: &str,
        effects: Vec<Effect>,
        ir_cache: &ImpulseResponseCache,
    ) -> Result<()> {
        let chain = build_chain(&effects, self.sample_rate, ir_cache)?;
        let processor = self.processor_mut(track_id)?;
        processor.chain = chain;
        processor.effects = effects;
        debug!(track = %track_id, "rebuilt track effect chain");
        Ok(())
    }

    /// Recompute whether any track is soloed and re-apply audibility to all
    pub fn update_solo_state(&mut self) {
        self.any_solo = self.processors.values().any(|p| p.solo);
        let any_solo = self.any_solo;
        for processor in self.processors.values_mut() {
            processor.apply_audibility(any_solo);
        }
    }

    /// Audibility of every track, keyed by track id
    pub fn get_effective_audibility(&self) -> BTreeMap<String, bool> {
        self.processors
            .iter()
            .map(|(id, p)| (id.clone(), p.audible))
            .collect()
    }

    /// Process one block of per-track input and return the master mix
    ///
    /// Tracks without an input this block are skipped. The block is as long
    /// as the longest input.
    pub fn process_block(&mut self, inputs: &BTreeMap<String, AudioBuffer>) -> AudioBuffer {
        let frames = inputs.values().map(AudioBuffer::num_frames).max().unwrap_or(0);
        let mut master = AudioBuffer::new(self.channels, frames, self.sample_rate);
        for (track_id, processor) in self.processors.iter_mut() {
            if let Some(input) = inputs.get(track_id) {
                master.add_from(&processor.process(input, self.channels));
            }
        }
        master
    }

    /// Clear every track's effect state
    pub fn reset(&mut self) {
        for processor in self.processors.values_mut() {
            processor.chain.reset();
        }
    }

    fn processor_mut(&mut self, track_id: &str) -> Result<&mut TrackProcessor> {
        self.processors
            .get_mut(track_id)
            .ok_or_else(|| SpliceError::not_found("track processor", track_id))
    }
}
