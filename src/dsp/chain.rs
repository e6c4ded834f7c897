//! Effect chain graph
//!
//! The builder turns an ordered effect list into a small directed acyclic
//! graph of processing stages. Each stage declares its inputs; a stage with
//! several inputs receives the sum of their outputs. Stages are stored in
//! topological order, so processing is a single forward pass.
//!
//! Shapes produced per effect:
//! - eq: one biquad stage per band, in band order
//! - compressor, delay, gain: a single stage
//! - reverb: `dry gain ∥ (convolver → wet gain) → merge`
//! - noise-reduction: nine peaking cuts, then a gate
//!
//! Disabled effects, `pan` (consumed by the mixer) and unsupported types add
//! no stages.

use std::fmt;

use tracing::debug;

use super::compressor::Compressor;
use super::convolution::Convolver;
use super::delay::Delay;
use super::effect::{Effect, EffectKind, Processor};
use super::eq::Biquad;
use super::gain::Gain;
use super::noise_bank::noise_reduction_stages;
use super::reverb::ImpulseResponseCache;
use crate::engine::AudioBuffer;
use crate::error::Result;

/// Index of a stage within its graph
pub type StageId = usize;

/// One node of the chain graph
pub struct Stage {
    id: StageId,
    label: String,
    inputs: Vec<StageId>,
    /// `None` passes (or sums) its inputs through unchanged
    processor: Option<Box<dyn Processor>>,
}

impl Stage {
    pub fn id(&self) -> StageId {
        self.id
    }

    /// Human-readable label such as `reverb:wet`
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn inputs(&self) -> &[StageId] {
        &self.inputs
    }

    /// Processor kind, or `passthrough`
    pub fn kind(&self) -> &'static str {
        self.processor
            .as_ref()
            .map(|p| p.kind())
            .unwrap_or("passthrough")
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind())
            .field("inputs", &self.inputs)
            .finish()
    }
}

/// Built processing graph for one effect list
#[derive(Debug)]
pub struct ChainGraph {
    stages: Vec<Stage>,
    edges: Vec<(StageId, StageId)>,
    first: StageId,
    last: StageId,
    applied_types: Vec<String>,
}

impl ChainGraph {
    /// Stages in topological order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Directed edges `(from, to)`
    pub fn edges(&self) -> &[(StageId, StageId)] {
        &self.edges
    }

    /// Entry stage; receives the chain input
    pub fn first(&self) -> StageId {
        self.first
    }

    /// Exit stage; its output is the chain output
    pub fn last(&self) -> StageId {
        self.last
    }

    /// Effect types that contributed stages, in chain order
    pub fn applied_types(&self) -> &[String] {
        &self.applied_types
    }

    /// Number of stages, including the entry stage
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when the chain is a bare pass-through
    pub fn is_empty(&self) -> bool {
        self.first == self.last
    }

    /// Run one block through the graph
    ///
    /// Stage state carries over between calls, so a stream may be fed in
    /// blocks of any size.
    pub fn process(&mut self, input: &AudioBuffer) -> AudioBuffer {
        if self.is_empty() {
            return input.clone();
        }

        let mut outputs: Vec<Option<AudioBuffer>> = Vec::with_capacity(self.stages.len());
        for stage in &mut self.stages {
            let mut buffer = if stage.inputs.is_empty() {
                input.clone()
            } else {
                sum_inputs(&outputs, &stage.inputs, input)
            };
            if let Some(processor) = stage.processor.as_mut() {
                processor.process(&mut buffer);
            }
            outputs.push(Some(buffer));
        }

        outputs
            .get_mut(self.last)
            .and_then(Option::take)
            .unwrap_or_else(|| input.clone())
    }

    /// Run a whole buffer through the graph in blocks of `block_size` frames
    pub fn process_in_blocks(
        &mut self,
        input: &AudioBuffer,
        block_size: usize,
    ) -> Result<AudioBuffer> {
        let block_size = block_size.max(1);
        if self.is_empty() || input.num_frames() <= block_size {
            return Ok(self.process(input));
        }

        let mut output: Option<AudioBuffer> = None;
        let mut start = 0;
        while start < input.num_frames() {
            let block = self.process(&input.slice_frames(start, start + block_size));
            match output.as_mut() {
                Some(out) => out.append(&block)?,
                None => output = Some(block),
            }
            start += block_size;
        }
        Ok(output.unwrap_or_else(|| input.clone()))
    }

    /// Clear the state of every stage
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            if let Some(processor) = stage.processor.as_mut() {
                processor.reset();
            }
        }
    }
}

/// Sum the outputs of `inputs`, widening to the largest channel count
fn sum_inputs(
    outputs: &[Option<AudioBuffer>],
    inputs: &[StageId],
    fallback: &AudioBuffer,
) -> AudioBuffer {
    let sources: Vec<&AudioBuffer> = inputs
        .iter()
        .filter_map(|&id| outputs.get(id).and_then(Option::as_ref))
        .collect();

    match sources.as_slice() {
        [] => fallback.clone(),
        [only] => (*only).clone(),
        [head, rest @ ..] => {
            let channels = sources
                .iter()
                .map(|b| b.num_channels())
                .max()
                .unwrap_or(1);
            let mut sum = head.with_channel_count(channels);
            for source in rest {
                sum.add_from(&source.with_channel_count(channels));
            }
            sum
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

struct GraphBuilder {
    stages: Vec<Stage>,
    edges: Vec<(StageId, StageId)>,
    cursor: StageId,
}

impl GraphBuilder {
    fn new() -> Self {
        Self {
            stages: vec![Stage {
                id: 0,
                label: "input".to_string(),
                inputs: Vec::new(),
                processor: None,
            }],
            edges: Vec::new(),
            cursor: 0,
        }
    }

    fn add(
        &mut self,
        label: String,
        processor: Option<Box<dyn Processor>>,
        inputs: Vec<StageId>,
    ) -> StageId {
        let id = self.stages.len();
        for &from in &inputs {
            self.edges.push((from, id));
        }
        self.stages.push(Stage {
            id,
            label,
            inputs,
            processor,
        });
        id
    }

    /// Append a stage fed by the current cursor and advance to it
    fn then(&mut self, label: String, processor: Box<dyn Processor>) {
        let from = self.cursor;
        self.cursor = self.add(label, Some(processor), vec![from]);
    }

    fn finish(self, applied_types: Vec<String>) -> ChainGraph {
        ChainGraph {
            stages: self.stages,
            edges: self.edges,
            first: 0,
            last: self.cursor,
            applied_types,
        }
    }
}

/// Build the processing graph for an effect list
///
/// Parameters are clamped here. Impulse responses come from `ir_cache`.
pub fn build_chain(
    effects: &[Effect],
    sample_rate: u32,
    ir_cache: &ImpulseResponseCache,
) -> Result<ChainGraph> {
    let mut builder = GraphBuilder::new();
    let mut applied = Vec::new();

    for effect in effects.iter().filter(|e| e.enabled) {
        let tag = effect.effect_type();
        match &effect.kind {
            EffectKind::Eq(params) => {
                let mut params = params.clone();
                params.clamp();
                for (i, band) in params.bands.iter().enumerate() {
                    builder.then(
                        format!("eq:band{}", i),
                        Box::new(Biquad::from_band(band, sample_rate)),
                    );
                }
            }
            EffectKind::Compressor(params) => {
                builder.then(
                    "compressor".to_string(),
                    Box::new(Compressor::new(*params, sample_rate)),
                );
            }
            EffectKind::Reverb(params) => {
                let mut params = *params;
                params.clamp();
                let impulse =
                    ir_cache.get_or_synthesize(params.room_size, params.damping, sample_rate)?;
                let split = builder.cursor;
                let dry = builder.add(
                    "reverb:dry".to_string(),
                    Some(Box::new(Gain::new(params.dry()))),
                    vec![split],
                );
                let convolver = builder.add(
                    "reverb:convolver".to_string(),
                    Some(Box::new(Convolver::new(&impulse)?)),
                    vec![split],
                );
                let wet = builder.add(
                    "reverb:wet".to_string(),
                    Some(Box::new(Gain::new(params.wet))),
                    vec![convolver],
                );
                builder.cursor = builder.add("reverb:merge".to_string(), None, vec![dry, wet]);
            }
            EffectKind::Delay(params) => {
                builder.then(
                    "delay".to_string(),
                    Box::new(Delay::new(*params, sample_rate)),
                );
            }
            EffectKind::Gain(params) => {
                let mut params = *params;
                params.clamp();
                builder.then("gain".to_string(), Box::new(Gain::new(params.value)));
            }
            EffectKind::NoiseReduction(params) => {
                for (i, stage) in noise_reduction_stages(params, sample_rate)
                    .into_iter()
                    .enumerate()
                {
                    builder.then(format!("noise-reduction:{}", i), stage);
                }
            }
            EffectKind::Pan(_) | EffectKind::Unsupported => continue,
        }
        applied.push(tag.to_string());
    }

    let graph = builder.finish(applied);
    debug!(
        stages = graph.len(),
        applied = ?graph.applied_types(),
        "built effect chain"
    );
    Ok(graph)
}

/// Output of [`apply_effect_chain`]
#[derive(Debug, Clone, PartialEq)]
pub struct EffectChainResult {
    pub buffer: AudioBuffer,
    pub applied_effects: Vec<String>,
}

/// Run `buffer` through a freshly built chain, returning a new buffer
pub fn apply_effect_chain(
    buffer: &AudioBuffer,
    effects: &[Effect],
    ir_cache: &ImpulseResponseCache,
) -> Result<EffectChainResult> {
    let mut chain = build_chain(effects, buffer.sample_rate(), ir_cache)?;
    let output = chain.process(buffer);
    Ok(EffectChainResult {
        buffer: output,
        applied_effects: chain.applied_types().to_vec(),
    })
}
