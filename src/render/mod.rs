//! Rendering and Mixing
//!
//! The timeline records the audio core reads, the offline renderer, buffer
//! mixing, and the real-time per-track mixing graph.

pub mod graph;
pub mod mixer;
pub mod offline;
pub mod timeline;

pub use graph::{MixingGraph, TrackProcessor, TrackProcessorConfig};
pub use mixer::mix_tracks;
pub use offline::{OfflineRenderer, RenderedAudio, MIN_RENDER_DURATION};
pub use timeline::{
    is_audible, Clip, ClipAudioRenderInfo, Project, ProjectSettings, Track, TrackAudioState,
    TrackKind,
};
