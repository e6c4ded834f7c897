//! Partitioned convolution
//!
//! Uniformly partitioned overlap-add convolution with zero latency. The
//! impulse response is split into blocks of `P` samples and transformed once
//! with a `2P` real FFT. Each input block is transformed into a half spectrum
//! and kept in a history ring; the output of a block is the inverse transform
//! of `X0·H0 + Σ X(-j)·Hj` plus the overlap tail carried from the previous
//! block. Calls may be any length: a partially filled block is re-transformed
//! on every call, which keeps the output sample-exact without added latency.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use realfft::num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use tracing::warn;

use super::effect::Processor;
use crate::engine::AudioBuffer;
use crate::error::{Result, SpliceError};

/// Partition length used by the reverb stage
pub const DEFAULT_PARTITION: usize = 1024;

type Spectrum = Vec<Complex32>;

/// acc += a * b, bin by bin
fn multiply_accumulate(acc: &mut [Complex32], a: &[Complex32], b: &[Complex32]) {
    for ((acc, a), b) in acc.iter_mut().zip(a).zip(b) {
        *acc += a * b;
    }
}

/// Single-channel partitioned convolver
#[derive(Clone)]
pub struct PartitionedConvolver {
    partition: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    /// Spectra of the impulse response partitions, H0 first
    ir_spectra: Vec<Spectrum>,
    /// Spectra of completed input blocks, newest first
    history: VecDeque<Spectrum>,
    /// Σ_{j≥1} history[j-1]·Hj, fixed for the duration of a block
    history_sum: Spectrum,
    block: Vec<f32>,
    fill: usize,
    tail: Vec<f32>,
    /// Zero-padded input of the current block
    padded: Vec<f32>,
    /// Spectrum of the current block
    current: Spectrum,
    /// Accumulated output spectrum
    product: Spectrum,
    /// Time-domain output of the current block
    output: Vec<f32>,
}

impl fmt::Debug for PartitionedConvolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedConvolver")
            .field("partition", &self.partition)
            .field("partitions", &self.ir_spectra.len())
            .field("fill", &self.fill)
            .finish()
    }
}

impl PartitionedConvolver {
    /// Build a convolver for `impulse` with partitions of `partition` samples
    ///
    /// `partition` is rounded up to a power of two.
    pub fn new(impulse: &[f32], partition: usize) -> Result<Self> {
        let partition = partition.max(1).next_power_of_two();
        let size = partition * 2;
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let bins = size / 2 + 1;

        let ir_spectra = impulse
            .chunks(partition)
            .map(|chunk| {
                let mut padded = forward.make_input_vec();
                padded[..chunk.len()].copy_from_slice(chunk);
                let mut spectrum = forward.make_output_vec();
                forward.process(&mut padded, &mut spectrum).map_err(|e| {
                    SpliceError::validation(format!("impulse transform failed: {}", e))
                })?;
                Ok(spectrum)
            })
            .collect::<Result<Vec<Spectrum>>>()?;

        let history_len = ir_spectra.len().saturating_sub(1);
        Ok(Self {
            partition,
            history: (0..history_len).map(|_| vec![Complex32::default(); bins]).collect(),
            history_sum: vec![Complex32::default(); bins],
            block: vec![0.0; partition],
            fill: 0,
            tail: vec![0.0; partition],
            padded: forward.make_input_vec(),
            current: forward.make_output_vec(),
            product: inverse.make_input_vec(),
            output: inverse.make_output_vec(),
            ir_spectra,
            forward,
            inverse,
        })
    }

    /// Number of IR partitions
    pub fn num_partitions(&self) -> usize {
        self.ir_spectra.len()
    }

    /// Convolve `samples` in place, continuing from the previous call
    pub fn process(&mut self, samples: &mut [f32]) {
        if self.ir_spectra.is_empty() {
            samples.fill(0.0);
            return;
        }
        let mut offset = 0;
        while offset < samples.len() {
            let take = (self.partition - self.fill).min(samples.len() - offset);
            let start = self.fill;
            self.block[start..start + take].copy_from_slice(&samples[offset..offset + take]);
            self.fill += take;

            self.transform_current_block();
            for i in 0..take {
                samples[offset + i] = self.output[start + i] + self.tail[start + i];
            }

            if self.fill == self.partition {
                self.finish_block();
            }
            offset += take;
        }
    }

    /// Clear all signal history
    pub fn reset(&mut self) {
        for spectrum in &mut self.history {
            spectrum.fill(Complex32::default());
        }
        self.history_sum.fill(Complex32::default());
        self.block.fill(0.0);
        self.tail.fill(0.0);
        self.fill = 0;
    }

    /// Leaves the time-domain output of the current block in `output`
    fn transform_current_block(&mut self) {
        let p = self.partition;
        self.padded[..p].copy_from_slice(&self.block);
        self.padded[p..].fill(0.0);
        if let Err(e) = self.forward.process(&mut self.padded, &mut self.current) {
            warn!(error = %e, "forward transform failed; block is silent");
            self.output.fill(0.0);
            return;
        }

        self.product.copy_from_slice(&self.history_sum);
        multiply_accumulate(&mut self.product, &self.current, &self.ir_spectra[0]);
        // DC and Nyquist bins of a real signal carry no imaginary part
        if let Some(first) = self.product.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = self.product.last_mut() {
            last.im = 0.0;
        }

        if let Err(e) = self.inverse.process(&mut self.product, &mut self.output) {
            warn!(error = %e, "inverse transform failed; block is silent");
            self.output.fill(0.0);
            return;
        }
        let scale = 1.0 / (2 * p) as f32;
        for v in &mut self.output {
            *v *= scale;
        }

        if self.fill == p {
            self.history_push();
        }
    }

    fn history_push(&mut self) {
        if let Some(mut oldest) = self.history.pop_back() {
            oldest.copy_from_slice(&self.current);
            self.history.push_front(oldest);
        }
    }

    fn finish_block(&mut self) {
        let p = self.partition;
        self.tail.copy_from_slice(&self.output[p..2 * p]);
        self.block.fill(0.0);
        self.fill = 0;

        self.history_sum.fill(Complex32::default());
        for (j, past) in self.history.iter().enumerate() {
            multiply_accumulate(&mut self.history_sum, past, &self.ir_spectra[j + 1]);
        }
    }
}

/// Convolution stage over a multi-channel impulse response
///
/// Output channel `c` convolves input channel `min(c, in - 1)` with impulse
/// channel `c % ir`, so a mono input through a stereo impulse becomes stereo.
#[derive(Debug, Clone)]
pub struct Convolver {
    /// One fresh convolver per impulse channel, cloned into lanes on demand
    templates: Vec<PartitionedConvolver>,
    lanes: Vec<PartitionedConvolver>,
}

impl Convolver {
    pub fn new(impulse: &AudioBuffer) -> Result<Self> {
        Self::with_partition(impulse, DEFAULT_PARTITION)
    }

    pub fn with_partition(impulse: &AudioBuffer, partition: usize) -> Result<Self> {
        let templates = impulse
            .channels()
            .map(|channel| PartitionedConvolver::new(channel, partition))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            lanes: templates.clone(),
            templates,
        })
    }

    fn ensure_lanes(&mut self, count: usize) {
        while self.lanes.len() < count {
            let c = self.lanes.len();
            self.lanes
                .push(self.templates[c % self.templates.len()].clone());
        }
    }
}

impl Processor for Convolver {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let in_channels = buffer.num_channels();
        let out_channels = in_channels.max(self.templates.len());
        self.ensure_lanes(out_channels);

        let mut output = buffer.with_channel_count(out_channels).into_channels();
        for (c, lane) in output.iter_mut().enumerate() {
            self.lanes[c].process(lane);
        }
        if let Ok(convolved) = AudioBuffer::from_channels(output, buffer.sample_rate()) {
            *buffer = convolved;
        }
    }

    fn reset(&mut self) {
        for lane in &mut self.lanes {
            lane.reset();
        }
    }

    fn kind(&self) -> &'static str {
        "convolver"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_convolution(x: &[f32], h: &[f32]) -> Vec<f32> {
        (0..x.len())
            .map(|n| {
                (0..h.len())
                    .filter(|&k| k <= n)
                    .map(|k| h[k] * x[n - k])
                    .sum()
            })
            .collect()
    }

    fn signal(n: usize) -> Vec<f32> {
        (0..n).map(|i| ((i * 37 % 101) as f32 / 50.0) - 1.0).collect()
    }

    #[test]
    fn test_matches_direct_convolution() {
        let h: Vec<f32> = (0..70).map(|i| 0.9_f32.powi(i) * if i % 2 == 0 { 1.0 } else { -0.5 }).collect();
        let x = signal(300);
        let expected = direct_convolution(&x, &h);

        let mut out = x.clone();
        PartitionedConvolver::new(&h, 16).unwrap().process(&mut out);

        for (a, b) in expected.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_arbitrary_call_sizes_match_single_call() {
        let h: Vec<f32> = (0..50).map(|i| 1.0 / (i as f32 + 1.0)).collect();
        let x = signal(257);

        let mut whole = x.clone();
        PartitionedConvolver::new(&h, 8).unwrap().process(&mut whole);

        let mut conv = PartitionedConvolver::new(&h, 8).unwrap();
        let mut pieces = Vec::new();
        for chunk in x.chunks(3) {
            let mut c = chunk.to_vec();
            conv.process(&mut c);
            pieces.extend(c);
        }

        for (a, b) in whole.iter().zip(pieces.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_identity_impulse() {
        let x = signal(100);
        let mut out = x.clone();
        PartitionedConvolver::new(&[1.0], 32).unwrap().process(&mut out);
        for (a, b) in x.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut conv = PartitionedConvolver::new(&[0.0, 0.0, 1.0], 4).unwrap();
        let mut first = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        conv.process(&mut first);
        assert!((first[2] - 1.0).abs() < 1e-6);
        conv.reset();
        let mut silent = vec![0.0; 8];
        conv.process(&mut silent);
        assert!(silent.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_mono_input_through_stereo_impulse_is_stereo() {
        let ir = AudioBuffer::from_channels(vec![vec![1.0], vec![0.5]], 48000).unwrap();
        let mut conv = Convolver::with_partition(&ir, 16).unwrap();
        let mut buffer = AudioBuffer::mono(vec![1.0, 0.5], 48000);
        conv.process(&mut buffer);
        assert_eq!(buffer.num_channels(), 2);
        assert!((buffer.channel(1)[0] - 0.5).abs() < 1e-5);
        assert!((buffer.channel(1)[1] - 0.25).abs() < 1e-5);
    }
}
