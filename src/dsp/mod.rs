//! DSP Effects Library
//!
//! Typed effect descriptors, the processing stages built from them, and the
//! chain builder shared by the offline renderer and the real-time graph.

pub mod chain;
pub mod compressor;
pub mod convolution;
pub mod delay;
pub mod effect;
pub mod eq;
pub mod gain;
pub mod gate;
pub mod noise_bank;
pub mod reverb;

pub use chain::{apply_effect_chain, build_chain, ChainGraph, EffectChainResult, Stage, StageId};
pub use compressor::{Compressor, CompressorParams};
pub use convolution::{Convolver, PartitionedConvolver};
pub use delay::{Delay, DelayParams};
pub use effect::{pan_from_effects, Effect, EffectKind, EqParams, GainParams, PanParams, Processor};
pub use eq::{Biquad, EQBand, FilterType};
pub use gain::{pan_buffer, Gain};
pub use gate::{Gate, GateParams};
pub use noise_bank::{noise_reduction_stages, NoiseReductionParams};
pub use reverb::{synthesize_impulse_response, ImpulseResponseCache, ReverbParams};
