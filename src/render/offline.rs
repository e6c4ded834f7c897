//! Offline mixing renderer
//!
//! Renders a time range of a project into one buffer. Each overlapping clip
//! is read from its decoded source (linear interpolation handles speed,
//! direction and sample-rate conversion at once), run through its effect
//! chain, shaped by its volume and fades, panned and summed onto its track
//! bus. Each bus then runs through the track chain, track volume and track
//! pan before reaching the master.
//!
//! Clip media that cannot be decoded is logged and rendered as silence; the
//! rest of the timeline still renders.

use tracing::{debug, warn};

use super::timeline::{is_audible, ClipAudioRenderInfo, Project, Track};
use crate::automation::curve::{clamp_volume, volume_envelope, VolumeKeyframe};
use crate::automation::fades::fit_fades;
use crate::dsp::chain::build_chain;
use crate::dsp::gain::pan_buffer;
use crate::dsp::reverb::ImpulseResponseCache;
use crate::engine::config::DEFAULT_BLOCK_SIZE;
use crate::engine::media::{DecodeCache, MediaSource};
use crate::engine::AudioBuffer;
use crate::error::{Result, SpliceError};

/// Shortest range a render covers, in seconds
pub const MIN_RENDER_DURATION: f64 = 0.001;

/// Clips and buses are mixed in stereo before adapting to the project layout
const BUS_CHANNELS: usize = 2;

/// Output of [`OfflineRenderer::render_audio`]
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAudio {
    pub buffer: AudioBuffer,
    pub start_time: f64,
    /// Rendered length in seconds, after the minimum-duration clamp
    pub duration: f64,
    pub channels: usize,
    pub sample_rate: u32,
}

/// Renders project ranges against a media source and shared caches
pub struct OfflineRenderer<'a> {
    media: &'a dyn MediaSource,
    decode_cache: &'a DecodeCache,
    ir_cache: &'a ImpulseResponseCache,
    block_size: usize,
}

impl<'a> OfflineRenderer<'a> {
    pub fn new(
        media: &'a dyn MediaSource,
        decode_cache: &'a DecodeCache,
        ir_cache: &'a ImpulseResponseCache,
    ) -> Self {
        Self {
            media,
            decode_cache,
            ir_cache,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Frames per block when running clip and track chains
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Render `[start_time, start_time + duration)` of `project`
    pub fn render_audio(
        &self,
        project: &Project,
        start_time: f64,
        duration: f64,
    ) -> Result<RenderedAudio> {
        if !start_time.is_finite() || !duration.is_finite() {
            return Err(SpliceError::InvalidParameter {
                param: "range".to_string(),
                value: format!("{}..+{}", start_time, duration),
                expected: "finite start time and duration".to_string(),
            });
        }
        let settings = project.settings;
        if settings.sample_rate == 0 || settings.channels == 0 {
            return Err(SpliceError::validation(
                "project sample rate and channel count must be non-zero",
            ));
        }

        let duration = duration.max(MIN_RENDER_DURATION);
        let sample_rate = settings.sample_rate;
        let frames = ((duration * sample_rate as f64).ceil() as usize).max(1);
        let range_end = start_time + duration;

        let tracks: Vec<&Track> = project
            .tracks
            .iter()
            .filter(|t| t.kind.carries_audio())
            .filter(|t| t.clips.iter().any(|c| c.overlaps(start_time, range_end)))
            .collect();
        let any_solo = tracks.iter().any(|t| t.solo);

        let mut master = AudioBuffer::new(BUS_CHANNELS, frames, sample_rate);
        for track in tracks {
            if !is_audible(track.muted, track.solo, any_solo) {
                debug!(track = %track.id, "skipping inaudible track");
                continue;
            }
            let bus = self.render_track(track, start_time, range_end, frames, sample_rate)?;
            master.add_from(&bus);
        }

        debug!(start_time, duration, frames, "rendered audio range");
        Ok(RenderedAudio {
            buffer: adapt_channels(master, settings.channels),
            start_time,
            duration,
            channels: settings.channels,
            sample_rate,
        })
    }

    fn render_track(
        &self,
        track: &Track,
        range_start: f64,
        range_end: f64,
        frames: usize,
        sample_rate: u32,
    ) -> Result<AudioBuffer> {
        let mut bus = AudioBuffer::new(BUS_CHANNELS, frames, sample_rate);
        for clip in &track.clips {
            if let Some(info) = ClipAudioRenderInfo::resolve(clip, range_start, range_end) {
                self.render_clip(&info, range_start, &mut bus)?;
            }
        }

        let mut chain = build_chain(&track.effects, sample_rate, self.ir_cache)?;
        let mut out = chain
            .process_in_blocks(&bus, self.block_size)?
            .with_channel_count(BUS_CHANNELS);
        out.apply_gain_linear(clamp_volume(track.volume));
        let pan = if track.pan.is_finite() {
            track.pan.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        if pan != 0.0 {
            out = pan_buffer(&out, pan);
        }
        Ok(out)
    }

    fn render_clip(
        &self,
        info: &ClipAudioRenderInfo,
        range_start: f64,
        bus: &mut AudioBuffer,
    ) -> Result<()> {
        let source = match self.decode_cache.get_or_decode(&info.media_id, self.media) {
            Ok(source) => source,
            Err(e) => {
                warn!(
                    clip = %info.clip_id,
                    media = %info.media_id,
                    error = %e,
                    "clip media unavailable, rendering silence"
                );
                return Ok(());
            }
        };

        let sample_rate = bus.sample_rate();
        let sr = sample_rate as f64;
        let first = ((info.render_start - range_start) * sr).round().max(0.0) as usize;
        let last = (((info.render_end - range_start) * sr).round().max(0.0) as usize)
            .min(bus.num_frames());
        if last <= first {
            return Ok(());
        }
        let len = last - first;

        let source_rate = source.sample_rate() as f64;
        let channels: Vec<Vec<f32>> = source
            .channels()
            .map(|channel| {
                (0..len)
                    .map(|i| {
                        let t = range_start + (first + i) as f64 / sr;
                        read_interpolated(channel, info.source_time(t) * source_rate)
                    })
                    .collect()
            })
            .collect();
        let mut segment = AudioBuffer::from_channels(channels, sample_rate)?;

        if !info.effects.is_empty() {
            let mut chain = build_chain(&info.effects, sample_rate, self.ir_cache)?;
            segment = chain.process_in_blocks(&segment, self.block_size)?;
        }

        let segment_start = range_start + first as f64 / sr;
        let envelope = volume_envelope(
            &clip_gain_keyframes(info, segment_start),
            sample_rate,
            len,
            info.volume,
        );
        for channel in segment.channels_mut() {
            for (sample, gain) in channel.iter_mut().zip(&envelope) {
                *sample *= gain;
            }
        }

        let mut stereo = segment.with_channel_count(BUS_CHANNELS);
        if info.pan != 0.0 {
            stereo = pan_buffer(&stereo, info.pan);
        }
        for (dst, src) in bus.channels_mut().zip(stereo.channels()) {
            for (d, s) in dst[first..last].iter_mut().zip(src) {
                *d += *s;
            }
        }
        Ok(())
    }
}

/// Volume and fade keyframes for a clip, timed relative to `segment_start`
///
/// Fades span the audible part of the clip: the fade-in starts where the
/// clip enters the range and the fade-out ends where it leaves it.
fn clip_gain_keyframes(info: &ClipAudioRenderInfo, segment_start: f64) -> Vec<VolumeKeyframe> {
    let audible = info.render_end - info.render_start;
    let (fade_in, fade_out) = fit_fades(audible, info.fade_in, info.fade_out);
    let start = info.render_start - segment_start;
    let end = info.render_end - segment_start;
    let volume = info.volume;

    let mut keyframes = Vec::with_capacity(4);
    if fade_in > 0.0 {
        keyframes.push(VolumeKeyframe::new(start, 0.0));
    }
    keyframes.push(VolumeKeyframe::new(start + fade_in, volume));
    if fade_out > 0.0 {
        keyframes.push(VolumeKeyframe::new(end - fade_out, volume));
        keyframes.push(VolumeKeyframe::new(end, 0.0));
    }
    keyframes
}

/// Linear-interpolated read at a fractional frame position; silence outside
fn read_interpolated(samples: &[f32], position: f64) -> f32 {
    if position.is_nan() || position < 0.0 {
        return 0.0;
    }
    let index = position.floor() as usize;
    let Some(&a) = samples.get(index) else {
        return 0.0;
    };
    let frac = (position - index as f64) as f32;
    if frac == 0.0 {
        return a;
    }
    let b = samples.get(index + 1).copied().unwrap_or(0.0);
    a + (b - a) * frac
}

/// Fold the stereo master into the project's channel layout
fn adapt_channels(master: AudioBuffer, channels: usize) -> AudioBuffer {
    match channels {
        BUS_CHANNELS => master,
        1 => AudioBuffer::mono(master.to_mono(), master.sample_rate()),
        n => master.with_channel_count(n),
    }
}
