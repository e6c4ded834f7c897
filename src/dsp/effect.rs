//! Effect descriptors and the processor trait
//!
//! An [`Effect`] is the declarative, serializable description stored on clips
//! and tracks. A [`Processor`] is the stateful node built from it by the chain
//! builder. Parameters are typed per effect and clamped once at build time.

use serde::{Deserialize, Serialize};

use super::compressor::CompressorParams;
use super::delay::DelayParams;
use super::eq::EQBand;
use super::noise_bank::NoiseReductionParams;
use super::reverb::ReverbParams;
use crate::engine::AudioBuffer;

/// A stateful processing node
///
/// Processors work in place. A processor may change the channel count of the
/// buffer (a panner turns mono into stereo) but never its length.
pub trait Processor: Send {
    /// Process a block of audio in place
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Clear internal state (filter history, delay lines, envelopes)
    fn reset(&mut self);

    /// Short identifier of the node kind, used in logs and chain summaries
    fn kind(&self) -> &'static str;
}

/// One entry in a clip or track effect list
///
/// Order in the list is processing order. Disabled entries keep their
/// position so reordering and serialization round-trip cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: EffectKind,
}

fn default_enabled() -> bool {
    true
}

impl Effect {
    /// Create an enabled effect with a fresh id
    pub fn new(kind: EffectKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            enabled: true,
            kind,
        }
    }

    /// Create an effect with an explicit id
    pub fn with_id(id: impl Into<String>, kind: EffectKind) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            kind,
        }
    }

    /// Builder-style toggle
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Type tag as it appears in serialized form
    pub fn effect_type(&self) -> &'static str {
        self.kind.type_name()
    }
}

/// Typed parameters for each supported effect, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EffectKind {
    Eq(EqParams),
    Compressor(CompressorParams),
    Reverb(ReverbParams),
    Delay(DelayParams),
    Gain(GainParams),
    Pan(PanParams),
    NoiseReduction(NoiseReductionParams),
    /// Any type this build does not know; skipped by the chain builder
    #[serde(other)]
    Unsupported,
}

impl EffectKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EffectKind::Eq(_) => "eq",
            EffectKind::Compressor(_) => "compressor",
            EffectKind::Reverb(_) => "reverb",
            EffectKind::Delay(_) => "delay",
            EffectKind::Gain(_) => "gain",
            EffectKind::Pan(_) => "pan",
            EffectKind::NoiseReduction(_) => "noise-reduction",
            EffectKind::Unsupported => "unsupported",
        }
    }
}

/// Parametric EQ: a ladder of filter bands applied in order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqParams {
    pub bands: Vec<EQBand>,
}

impl EqParams {
    pub fn clamp(&mut self) {
        for band in &mut self.bands {
            band.clamp();
        }
    }
}

/// Scalar gain, linear (1.0 = unity)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainParams {
    pub value: f32,
}

impl Default for GainParams {
    fn default() -> Self {
        Self { value: 1.0 }
    }
}

impl GainParams {
    pub fn clamp(&mut self) {
        self.value = if self.value.is_finite() {
            self.value.clamp(0.0, 4.0)
        } else {
            1.0
        };
    }
}

/// Stereo position, -1 (left) to 1 (right)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanParams {
    pub value: f32,
}

impl PanParams {
    pub fn clamp(&mut self) {
        self.value = if self.value.is_finite() {
            self.value.clamp(-1.0, 1.0)
        } else {
            0.0
        };
    }
}

/// Pan value of the first enabled `pan` effect in a list, or 0
pub fn pan_from_effects(effects: &[Effect]) -> f32 {
    effects
        .iter()
        .filter(|e| e.enabled)
        .find_map(|e| match &e.kind {
            EffectKind::Pan(p) => {
                let mut p = *p;
                p.clamp();
                Some(p.value)
            }
            _ => None,
        })
        .unwrap_or(0.0)
}
