//! Timeline records read by the renderers
//!
//! The project/track/clip model is owned by the editor; these are the
//! serde shapes the audio core reads. Nothing here is persisted by this
//! crate.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::automation::curve::clamp_volume;
use crate::dsp::effect::{pan_from_effects, Effect};
use crate::error::{Result, SpliceError};

/// Whether a track is heard, given its own state and whether any track is soloed
#[inline]
pub fn is_audible(muted: bool, solo: bool, any_solo: bool) -> bool {
    !muted && (!any_solo || solo)
}

/// Project-wide output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectSettings {
    pub sample_rate: u32,
    pub channels: usize,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// Track kind; only audio and video tracks carry sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    #[default]
    Audio,
    Video,
    Text,
    Image,
    #[serde(other)]
    Other,
}

impl TrackKind {
    pub fn carries_audio(self) -> bool {
        matches!(self, TrackKind::Audio | TrackKind::Video)
    }
}

/// A media clip placed on a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Clip {
    pub id: String,
    pub media_id: String,
    /// Timeline position in seconds
    pub start_time: f64,
    /// Timeline length in seconds
    pub duration: f64,
    /// Source position (seconds) heard at the clip start
    pub in_point: f64,
    pub volume: f32,
    /// Playback speed; the clip consumes `duration * speed` seconds of source
    pub speed: f64,
    pub reversed: bool,
    pub fade_in: f64,
    pub fade_out: f64,
    pub effects: Vec<Effect>,
}

impl Default for Clip {
    fn default() -> Self {
        Self {
            id: String::new(),
            media_id: String::new(),
            start_time: 0.0,
            duration: 0.0,
            in_point: 0.0,
            volume: 1.0,
            speed: 1.0,
            reversed: false,
            fade_in: 0.0,
            fade_out: 0.0,
            effects: Vec::new(),
        }
    }
}

impl Clip {
    pub fn new(
        id: impl Into<String>,
        media_id: impl Into<String>,
        start_time: f64,
        duration: f64,
    ) -> Self {
        Self {
            id: id.into(),
            media_id: media_id.into(),
            start_time,
            duration,
            ..Self::default()
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// True if the clip intersects `[start, end)`
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.duration > 0.0 && self.start_time < end && self.end_time() > start
    }
}

/// A timeline track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TrackKind,
    pub muted: bool,
    pub solo: bool,
    pub volume: f32,
    pub pan: f32,
    pub effects: Vec<Effect>,
    pub clips: Vec<Clip>,
}

impl Default for Track {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: TrackKind::Audio,
            muted: false,
            solo: false,
            volume: 1.0,
            pan: 0.0,
            effects: Vec::new(),
            clips: Vec::new(),
        }
    }
}

impl Track {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            ..Self::default()
        }
    }

    /// Snapshot of the state the mixers read
    pub fn audio_state(&self) -> TrackAudioState {
        TrackAudioState {
            muted: self.muted,
            solo: self.solo,
            volume: self.volume,
            pan: self.pan,
            effects: self.effects.clone(),
        }
    }
}

/// Mixer-facing snapshot of a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackAudioState {
    pub muted: bool,
    pub solo: bool,
    pub volume: f32,
    pub pan: f32,
    pub effects: Vec<Effect>,
}

/// A project as seen by the audio core
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub settings: ProjectSettings,
    pub tracks: Vec<Track>,
}

impl Project {
    pub fn from_json(json: &str) -> Result<Self> {
        let project: Project = serde_json::from_str(json)?;
        if project.settings.sample_rate == 0 || project.settings.channels == 0 {
            return Err(SpliceError::validation(
                "project sample rate and channel count must be non-zero",
            ));
        }
        Ok(project)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Render-call-scoped view of one clip clamped to a time range
#[derive(Debug, Clone, PartialEq)]
pub struct ClipAudioRenderInfo {
    pub clip_id: String,
    pub media_id: String,
    pub clip_start: f64,
    pub clip_end: f64,
    /// Clamped start of the audible part (timeline seconds)
    pub render_start: f64,
    /// Clamped end of the audible part (timeline seconds)
    pub render_end: f64,
    pub in_point: f64,
    /// Source position at `render_start`
    pub source_offset: f64,
    pub volume: f32,
    pub pan: f32,
    pub effects: Vec<Effect>,
    pub fade_in: f64,
    pub fade_out: f64,
    pub speed: f64,
    pub reversed: bool,
}

impl ClipAudioRenderInfo {
    /// Resolve a clip against `[range_start, range_end)`; `None` if it does not overlap
    pub fn resolve(clip: &Clip, range_start: f64, range_end: f64) -> Option<Self> {
        if !clip.overlaps(range_start, range_end) {
            return None;
        }
        let speed = if clip.speed.is_finite() && clip.speed > 0.0 {
            clip.speed
        } else {
            1.0
        };
        let render_start = clip.start_time.max(range_start);
        let render_end = clip.end_time().min(range_end);
        Some(Self {
            clip_id: clip.id.clone(),
            media_id: clip.media_id.clone(),
            clip_start: clip.start_time,
            clip_end: clip.end_time(),
            render_start,
            render_end,
            in_point: clip.in_point,
            source_offset: clip.in_point + (range_start - clip.start_time).max(0.0),
            volume: clamp_volume(clip.volume),
            pan: pan_from_effects(&clip.effects),
            effects: clip.effects.clone(),
            fade_in: clip.fade_in.max(0.0),
            fade_out: clip.fade_out.max(0.0),
            speed,
            reversed: clip.reversed,
        })
    }

    /// Signed playback rate
    pub fn playback_rate(&self) -> f64 {
        if self.reversed {
            -self.speed
        } else {
            self.speed
        }
    }

    /// Source position heard at timeline time `t`
    ///
    /// Playback starts at `source_offset` and moves at the signed playback
    /// rate, so a reversed clip walks back from its offset toward zero.
    pub fn source_time(&self, t: f64) -> f64 {
        self.source_offset + (t - self.render_start) * self.playback_rate()
    }
}
