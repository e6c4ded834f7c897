//! Mixing of pre-rendered buffers

use crate::automation::curve::clamp_volume;
use crate::dsp::gain::pan_buffer;
use crate::engine::io::resample;
use crate::engine::AudioBuffer;
use crate::error::{Result, SpliceError};

/// Gain, pan and sum `buffers` into one stereo buffer
///
/// The result is as long as the longest input and uses the first buffer's
/// sample rate; other rates are resampled. Missing volumes default to 1 and
/// missing pans to 0.
pub fn mix_tracks(buffers: &[AudioBuffer], volumes: &[f32], pans: &[f32]) -> Result<AudioBuffer> {
    let first = buffers
        .first()
        .ok_or_else(|| SpliceError::validation("mix_tracks needs at least one buffer"))?;
    let sample_rate = first.sample_rate();

    let prepared: Vec<AudioBuffer> = buffers
        .iter()
        .enumerate()
        .map(|(i, buffer)| {
            let mut track = resample(buffer, sample_rate).with_channel_count(2);
            track.apply_gain_linear(clamp_volume(volumes.get(i).copied().unwrap_or(1.0)));
            let pan = pans.get(i).copied().unwrap_or(0.0);
            if pan != 0.0 && pan.is_finite() {
                track = pan_buffer(&track, pan.clamp(-1.0, 1.0));
            }
            track
        })
        .collect();

    let frames = prepared.iter().map(AudioBuffer::num_frames).max().unwrap_or(0);
    let mut mix = AudioBuffer::new(2, frames, sample_rate);
    for track in &prepared {
        mix.add_from(track);
    }
    Ok(mix)
}
