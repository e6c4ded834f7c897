//! Engine context
//!
//! [`AudioEngine`] owns every piece of shared state the audio core keeps
//! between calls: the decode cache, the impulse-response cache, learned noise
//! profiles and the live mixing graph. That state exists only between
//! [`AudioEngine::init`] and [`AudioEngine::dispose`]; any operation outside
//! that window fails with `NotInitialized`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::analysis::beat::{analyze_audio_buffer, analyze_from_blob, BeatAnalysisResult};
use crate::analysis::denoise::{NoiseProfile, NoiseProfileStore};
use crate::automation::curve::{apply_volume_automation, CurveType, VolumeKeyframe};
use crate::automation::ducking::{apply_ducking, DuckingParams};
use crate::automation::fades::apply_fades;
use crate::automation::realtime::{RealtimeDucker, SharedDucker};
use crate::dsp::chain::{apply_effect_chain, EffectChainResult};
use crate::dsp::effect::Effect;
use crate::dsp::reverb::ImpulseResponseCache;
use crate::engine::config::EngineConfig;
use crate::engine::media::{DecodeCache, MediaSource};
use crate::engine::AudioBuffer;
use crate::error::{Result, SpliceError};
use crate::render::graph::{MixingGraph, TrackProcessorConfig};
use crate::render::offline::{OfflineRenderer, RenderedAudio};
use crate::render::timeline::Project;

/// State that lives between init and dispose
struct EngineContext {
    decode_cache: DecodeCache,
    ir_cache: ImpulseResponseCache,
    profiles: NoiseProfileStore,
    graph: MixingGraph,
}

/// The audio core's entry point
pub struct AudioEngine {
    config: EngineConfig,
    media: Box<dyn MediaSource>,
    context: Option<EngineContext>,
}

impl AudioEngine {
    /// Create an engine; call [`init`](Self::init) before using it
    pub fn new(config: EngineConfig, media: Box<dyn MediaSource>) -> Self {
        Self {
            config,
            media,
            context: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    /// Validate the configuration and create fresh engine state
    ///
    /// Calling `init` on an initialized engine is a no-op.
    pub fn init(&mut self) -> Result<()> {
        if self.context.is_some() {
            return Ok(());
        }
        self.config.validate()?;
        self.context = Some(EngineContext {
            decode_cache: DecodeCache::new(),
            ir_cache: ImpulseResponseCache::new(),
            profiles: NoiseProfileStore::new(),
            graph: MixingGraph::new(self.config.sample_rate, self.config.channels),
        });
        info!(
            sample_rate = self.config.sample_rate,
            channels = self.config.channels,
            "audio engine initialized"
        );
        Ok(())
    }

    /// Drop all engine state
    pub fn dispose(&mut self) {
        if self.context.take().is_some() {
            info!("audio engine disposed");
        }
    }

    fn context(&self, operation: &str) -> Result<&EngineContext> {
        self.context.as_ref().ok_or_else(|| SpliceError::NotInitialized {
            operation: operation.to_string(),
        })
    }

    fn context_mut(&mut self, operation: &str) -> Result<&mut EngineContext> {
        self.context.as_mut().ok_or_else(|| SpliceError::NotInitialized {
            operation: operation.to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Offline rendering and effects
    // ------------------------------------------------------------------

    /// Render a time range of a project
    pub fn render_audio(
        &self,
        project: &Project,
        start_time: f64,
        duration: f64,
    ) -> Result<RenderedAudio> {
        let ctx = self.context("render audio")?;
        OfflineRenderer::new(self.media.as_ref(), &ctx.decode_cache, &ctx.ir_cache)
            .with_block_size(self.config.block_size)
            .render_audio(project, start_time, duration)
    }

    /// Run a buffer through an effect list
    pub fn apply_effect_chain(
        &self,
        buffer: &AudioBuffer,
        effects: &[Effect],
    ) -> Result<EffectChainResult> {
        let ctx = self.context("apply effect chain")?;
        apply_effect_chain(buffer, effects, &ctx.ir_cache)
    }

    // ------------------------------------------------------------------
    // Noise reduction
    // ------------------------------------------------------------------

    /// Learn a noise profile from `buffer` and store it under `id`
    pub fn learn_noise_profile(&mut self, buffer: &AudioBuffer, id: &str) -> Result<&NoiseProfile> {
        let frame_config = self.config.noise_profile;
        let ctx = self.context_mut("learn noise profile")?;
        ctx.profiles.learn(buffer, id, &frame_config)
    }

    /// Denoise `buffer` with the profile stored under `id`
    pub fn apply_noise_reduction_with_profile(
        &self,
        buffer: &AudioBuffer,
        id: &str,
        reduction: f32,
    ) -> Result<AudioBuffer> {
        self.context("apply noise reduction")?
            .profiles
            .apply(buffer, id, reduction)
    }

    pub fn noise_profile(&self, id: &str) -> Result<&NoiseProfile> {
        self.context("read noise profile")?.profiles.get(id)
    }

    // ------------------------------------------------------------------
    // Beat analysis
    // ------------------------------------------------------------------

    pub fn analyze_audio_buffer(&self, buffer: &AudioBuffer) -> Result<BeatAnalysisResult> {
        self.context("analyze audio")?;
        Ok(analyze_audio_buffer(buffer, &self.config.beat))
    }

    pub fn analyze_from_blob(&self, bytes: &[u8]) -> Result<BeatAnalysisResult> {
        self.context("analyze audio")?;
        analyze_from_blob(bytes, &self.config.beat)
    }

    #[cfg(feature = "remote")]
    pub fn analyze_from_url(&self, url: &str) -> Result<BeatAnalysisResult> {
        self.context("analyze audio")?;
        crate::analysis::beat::analyze_from_url(url, &self.config.beat)
    }

    // ------------------------------------------------------------------
    // Live mixing graph
    // ------------------------------------------------------------------

    pub fn create_track_processor(&mut self, config: TrackProcessorConfig) -> Result<()> {
        let ctx = self.context_mut("create track processor")?;
        ctx.graph.create_track_processor(config, &ctx.ir_cache)
    }

    pub fn remove_track_processor(&mut self, track_id: &str) -> Result<bool> {
        Ok(self
            .context_mut("remove track processor")?
            .graph
            .remove_track_processor(track_id))
    }

    pub fn set_track_muted(&mut self, track_id: &str, muted: bool) -> Result<()> {
        self.context_mut("set track muted")?
            .graph
            .set_track_muted(track_id, muted)
    }

    pub fn set_track_solo(&mut self, track_id: &str, solo: bool) -> Result<()> {
        self.context_mut("set track solo")?
            .graph
            .set_track_solo(track_id, solo)
    }

    pub fn set_track_volume(&mut self, track_id: &str, volume: f32) -> Result<()> {
        self.context_mut("set track volume")?
            .graph
            .set_track_volume(track_id, volume)
    }

    pub fn set_track_pan(&mut self, track_id: &str, pan: f32) -> Result<()> {
        self.context_mut("set track pan")?
            .graph
            .set_track_pan(track_id, pan)
    }

    pub fn set_track_effects(&mut self, track_id: &str, effects: Vec<Effect>) -> Result<()> {
        let ctx = self.context_mut("set track effects")?;
        ctx.graph.set_track_effects(track_id, effects, &ctx.ir_cache)
    }

    pub fn update_solo_state(&mut self) -> Result<()> {
        self.context_mut("update solo state")?
            .graph
            .update_solo_state();
        Ok(())
    }

    pub fn get_effective_audibility(&self) -> Result<BTreeMap<String, bool>> {
        Ok(self
            .context("read audibility")?
            .graph
            .get_effective_audibility())
    }

    /// Mix one block of per-track input through the live graph
    pub fn process_block(
        &mut self,
        inputs: &BTreeMap<String, AudioBuffer>,
    ) -> Result<AudioBuffer> {
        Ok(self.context_mut("process block")?.graph.process_block(inputs))
    }

    pub fn mixing_graph(&self) -> Result<&MixingGraph> {
        Ok(&self.context("read mixing graph")?.graph)
    }

    // ------------------------------------------------------------------
    // Automation
    // ------------------------------------------------------------------

    pub fn apply_volume_automation(
        &self,
        buffer: &AudioBuffer,
        keyframes: &[VolumeKeyframe],
        base: f32,
    ) -> Result<AudioBuffer> {
        self.context("apply volume automation")?;
        Ok(apply_volume_automation(buffer, keyframes, base))
    }

    pub fn apply_fades(
        &self,
        buffer: &AudioBuffer,
        fade_in: f64,
        fade_out: f64,
        curve: CurveType,
    ) -> Result<AudioBuffer> {
        self.context("apply fades")?;
        Ok(apply_fades(buffer, fade_in, fade_out, curve))
    }

    /// Duck `background` under `foreground`; `params` default to the engine config
    pub fn apply_ducking(
        &self,
        background: &AudioBuffer,
        foreground: &AudioBuffer,
        params: Option<&DuckingParams>,
        base: f32,
    ) -> Result<AudioBuffer> {
        self.context("apply ducking")?;
        let params = params.unwrap_or(&self.config.ducking);
        Ok(apply_ducking(background, foreground, params, base))
    }

    /// Create a shared real-time ducker at the engine sample rate
    pub fn create_realtime_ducker(
        &self,
        params: Option<DuckingParams>,
        base: f32,
    ) -> Result<SharedDucker> {
        self.context("create realtime ducker")?;
        let params = params.unwrap_or(self.config.ducking);
        Ok(Arc::new(Mutex::new(RealtimeDucker::new(
            params,
            self.config.sample_rate,
            base,
        ))))
    }

    // ------------------------------------------------------------------
    // Caches
    // ------------------------------------------------------------------

    /// Drop decoded media and synthesized impulse responses
    ///
    /// Noise profiles and track processors are kept.
    pub fn clear_caches(&self) -> Result<()> {
        let ctx = self.context("clear caches")?;
        ctx.decode_cache.clear();
        ctx.ir_cache.clear();
        Ok(())
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
