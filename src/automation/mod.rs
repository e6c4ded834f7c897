//! Volume Automation
//!
//! Keyframe curves, fades, offline ducking and the real-time sidechain
//! ducker.

pub mod curve;
pub mod ducking;
pub mod fades;
pub mod realtime;

pub use curve::{
    apply_volume_automation, clamp_volume, get_volume_at_time, normalize_keyframes,
    volume_envelope, BezierControls, CurveType, VolumeKeyframe, MAX_VOLUME,
};
pub use ducking::{apply_ducking, generate_ducking_keyframes, DuckingParams};
pub use fades::{apply_fade_in, apply_fade_out, apply_fades};
pub use realtime::{lock_ducker, spawn_ducker_task, DuckerTask, RealtimeDucker, SharedDucker};
