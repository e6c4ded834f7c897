//! Audio Buffer Management
//!
//! The PCM value type shared by every subsystem: a channel count, a sample
//! rate and one `Vec<f32>` per channel, all of equal length. Operations in
//! this crate read buffers and derive new ones; a caller's buffer is never
//! mutated in place.

use crate::error::{Result, SpliceError};

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns `-f32::INFINITY` for zero or negative input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Linear RMS of a slice of samples (0.0 for an empty slice)
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Linear peak (maximum absolute value) of a slice of samples
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

/// Calculate the RMS level of an audio buffer in dB over all channels
///
/// Returns `-f32::INFINITY` for empty or silent buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.num_frames();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Calculate the peak level of an audio buffer in dB over all channels
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    let peak = buffer
        .samples
        .iter()
        .map(|channel| peak(channel))
        .fold(0.0_f32, f32::max);

    linear_to_db(peak)
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Non-interleaved 32-bit float PCM buffer
///
/// # Example
/// ```
/// use splice::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::new(2, 48000, 48000);
/// assert_eq!(buffer.num_channels(), 2);
/// assert_eq!(buffer.num_frames(), 48000);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is frames
    samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given shape
    pub fn new(num_channels: usize, num_frames: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_frames]; num_channels.max(1)],
            sample_rate,
        }
    }

    /// Create a buffer from per-channel sample vectors
    ///
    /// Fails with `Validation` when there are no channels, when channel
    /// lengths differ, or when the sample rate is zero.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if samples.is_empty() {
            return Err(SpliceError::validation("buffer must have at least one channel"));
        }
        if sample_rate == 0 {
            return Err(SpliceError::validation("sample rate must be non-zero"));
        }
        let frames = samples[0].len();
        if let Some((index, channel)) = samples
            .iter()
            .enumerate()
            .find(|(_, ch)| ch.len() != frames)
        {
            return Err(SpliceError::validation(format!(
                "channel {} has {} frames, expected {}",
                index,
                channel.len(),
                frames
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create a mono buffer from a single channel
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: vec![samples],
            sample_rate,
        }
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(
        interleaved: &[f32],
        num_channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if num_channels == 0 {
            return Err(SpliceError::validation("buffer must have at least one channel"));
        }
        if interleaved.len() % num_channels != 0 {
            return Err(SpliceError::validation(format!(
                "interleaved data length {} is not divisible by channel count {}",
                interleaved.len(),
                num_channels
            )));
        }

        let num_frames = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_frames); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Self::from_channels(samples, sample_rate)
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_frames = self.num_frames();
        let mut interleaved = Vec::with_capacity(self.num_channels() * num_frames);

        for frame in 0..num_frames {
            for channel in &self.samples {
                interleaved.push(channel[frame]);
            }
        }

        interleaved
    }

    /// Number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of frames (samples per channel)
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_frames() == 0
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_frames() as f64 / self.sample_rate as f64
    }

    /// Immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Iterate over channels
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.samples.iter().map(|ch| ch.as_slice())
    }

    /// Iterate mutably over channels
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut Vec<f32>> {
        self.samples.iter_mut()
    }

    /// Consume the buffer and return its channel vectors
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.samples
    }

    /// Average all channels into a single channel
    pub fn to_mono(&self) -> Vec<f32> {
        if self.num_channels() == 1 {
            return self.samples[0].clone();
        }
        let scale = 1.0 / self.num_channels() as f32;
        (0..self.num_frames())
            .map(|i| self.samples.iter().map(|ch| ch[i]).sum::<f32>() * scale)
            .collect()
    }

    /// Return a copy adapted to `num_channels`
    ///
    /// Mono is duplicated into every output channel; otherwise channels are
    /// copied by index and missing channels fall back to the last source channel.
    pub fn with_channel_count(&self, num_channels: usize) -> AudioBuffer {
        let num_channels = num_channels.max(1);
        if num_channels == self.num_channels() {
            return self.clone();
        }
        if self.samples.is_empty() {
            return AudioBuffer::new(num_channels, 0, self.sample_rate);
        }
        let last = self.num_channels() - 1;
        let samples = (0..num_channels)
            .map(|ch| self.samples[ch.min(last)].clone())
            .collect();
        AudioBuffer {
            samples,
            sample_rate: self.sample_rate,
        }
    }

    /// Copy of frames `[start, end)`, clamped to the buffer length
    pub fn slice_frames(&self, start: usize, end: usize) -> AudioBuffer {
        let end = end.min(self.num_frames());
        let start = start.min(end);
        Self {
            samples: self.samples.iter().map(|ch| ch[start..end].to_vec()).collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Append the frames of `other` after this buffer's frames
    ///
    /// Channel counts must match.
    pub fn append(&mut self, other: &AudioBuffer) -> Result<()> {
        if other.num_channels() != self.num_channels() {
            return Err(SpliceError::validation(format!(
                "cannot append {} channels to {}",
                other.num_channels(),
                self.num_channels()
            )));
        }
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            dst.extend_from_slice(src);
        }
        Ok(())
    }

    /// Add `other` into this buffer sample by sample
    ///
    /// Only the overlapping channels and frames are summed.
    pub fn add_from(&mut self, other: &AudioBuffer) {
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d += *s;
            }
        }
    }

    /// Zero every sample
    pub fn clear(&mut self) {
        for channel in &mut self.samples {
            channel.fill(0.0);
        }
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Multiply every sample by a linear gain
    pub fn apply_gain_linear(&mut self, gain: f32) {
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(2, 0, 48000)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_linear() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-6.0206) - 0.5).abs() < 1e-4);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-6);
        assert!(db_to_linear(-120.0) < 1e-5);
    }

    #[test]
    fn test_linear_to_db() {
        assert!((linear_to_db(1.0) - 0.0).abs() < 1e-6);
        assert!((linear_to_db(0.1) - (-20.0)).abs() < 1e-4);
        assert!(linear_to_db(0.0).is_infinite() && linear_to_db(0.0).is_sign_negative());
    }

    #[test]
    fn test_calculate_rms_and_peak() {
        let buffer = AudioBuffer::from_channels(vec![vec![1.0; 1000]], 48000).unwrap();
        assert!(calculate_rms(&buffer).abs() < 0.01);
        assert!(calculate_peak(&buffer).abs() < 0.01);

        let silent = AudioBuffer::new(1, 1000, 48000);
        assert!(calculate_rms(&silent).is_infinite());
    }

    #[test]
    fn test_from_channels_rejects_ragged() {
        let result = AudioBuffer::from_channels(vec![vec![0.0; 10], vec![0.0; 9]], 44100);
        assert!(matches!(result, Err(SpliceError::Validation { .. })));
    }

    #[test]
    fn test_interleave_roundtrip() {
        let interleaved = vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        let buffer = AudioBuffer::from_interleaved(&interleaved, 2, 44100).unwrap();
        assert_eq!(buffer.num_frames(), 3);
        assert_eq!(buffer.channel(0), &[0.1, 0.2, 0.3]);
        assert_eq!(buffer.channel(1), &[-0.1, -0.2, -0.3]);
        assert_eq!(buffer.to_interleaved(), interleaved);
    }

    #[test]
    fn test_from_interleaved_rejects_partial_frame() {
        assert!(AudioBuffer::from_interleaved(&[0.0; 5], 2, 44100).is_err());
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let buffer =
            AudioBuffer::from_channels(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 44100).unwrap();
        assert_eq!(buffer.to_mono(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_with_channel_count_duplicates_mono() {
        let buffer = AudioBuffer::mono(vec![0.25; 4], 44100);
        let stereo = buffer.with_channel_count(2);
        assert_eq!(stereo.num_channels(), 2);
        assert_eq!(stereo.channel(1), &[0.25; 4]);
    }

    #[test]
    fn test_add_from_sums_overlap() {
        let mut a = AudioBuffer::mono(vec![0.5; 4], 44100);
        let b = AudioBuffer::mono(vec![0.25; 2], 44100);
        a.add_from(&b);
        assert_eq!(a.channel(0), &[0.75, 0.75, 0.5, 0.5]);
    }

    #[test]
    fn test_slice_and_append_rebuild_buffer() {
        let buffer =
            AudioBuffer::from_channels(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]], 44100)
                .unwrap();
        let mut head = buffer.slice_frames(0, 2);
        assert_eq!(head.channel(1), &[4.0, 5.0]);
        head.append(&buffer.slice_frames(2, 10)).unwrap();
        assert_eq!(head, buffer);
        assert!(head.append(&AudioBuffer::mono(vec![0.0], 44100)).is_err());
    }
}
