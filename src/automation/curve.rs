//! Volume keyframes and curve evaluation
//!
//! A keyframe's curve shapes the segment from that keyframe to the next.
//! Evaluation clamps to the volume range `[0, 4]`.

use serde::{Deserialize, Serialize};

use crate::engine::AudioBuffer;

/// Maximum volume (linear, +12 dB)
pub const MAX_VOLUME: f32 = 4.0;

/// Points per sampled value curve
pub const VALUE_CURVE_POINTS: usize = 128;

/// Geometric ramps cannot pass through zero; values are floored here
const EXPONENTIAL_FLOOR: f32 = 1e-4;

// ============ Curve Types ============

/// Interpolation shape between two keyframes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CurveType {
    /// Constant rate of change
    #[default]
    Linear,
    /// Slow start, fast end (`u²`)
    Exponential,
    /// Fast start, slow end (`log10(1 + 9u)`)
    Logarithmic,
    /// Smoothstep (`u²(3 - 2u)`)
    SCurve,
    /// Cubic Bézier through the Y components of the control points
    Bezier,
}

/// Bézier control points
///
/// Only `y1` and `y2` shape the curve; the X components are carried for
/// round-tripping editor data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BezierControls {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Default for BezierControls {
    fn default() -> Self {
        Self {
            x1: 0.25,
            y1: 0.1,
            x2: 0.25,
            y2: 1.0,
        }
    }
}

impl CurveType {
    /// Shape a normalized position `u` in `[0, 1]`
    ///
    /// Returns exactly 0 at `u = 0` and exactly 1 at `u = 1`.
    pub fn shape(self, u: f64, controls: Option<&BezierControls>) -> f64 {
        let u = u.clamp(0.0, 1.0);
        match self {
            CurveType::Linear => u,
            CurveType::Exponential => u * u,
            CurveType::Logarithmic => (1.0 + 9.0 * u).log10() / 10.0_f64.log10(),
            CurveType::SCurve => u * u * (3.0 - 2.0 * u),
            CurveType::Bezier => {
                let c = controls.copied().unwrap_or_default();
                let inv = 1.0 - u;
                3.0 * inv * inv * u * c.y1 as f64 + 3.0 * inv * u * u * c.y2 as f64 + u * u * u
            }
        }
    }
}

// ============ Keyframes ============

/// A volume breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeKeyframe {
    /// Time in seconds
    pub time: f64,
    /// Linear volume (0 to 4)
    pub value: f32,
    /// Shape of the segment leaving this keyframe
    #[serde(default)]
    pub curve: CurveType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bezier_controls: Option<BezierControls>,
}

impl VolumeKeyframe {
    pub fn new(time: f64, value: f32) -> Self {
        Self {
            time,
            value,
            curve: CurveType::Linear,
            bezier_controls: None,
        }
    }

    pub fn with_curve(mut self, curve: CurveType) -> Self {
        self.curve = curve;
        self
    }

    pub fn with_bezier(mut self, controls: BezierControls) -> Self {
        self.curve = CurveType::Bezier;
        self.bezier_controls = Some(controls);
        self
    }
}

/// Clamp a volume to `[0, 4]`; NaN maps to 0
pub fn clamp_volume(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_VOLUME)
    }
}

/// Sort by time, keeping the first of any keyframes sharing a time
pub fn normalize_keyframes(keyframes: &[VolumeKeyframe]) -> Vec<VolumeKeyframe> {
    let mut sorted: Vec<VolumeKeyframe> = keyframes
        .iter()
        .filter(|k| k.time.is_finite())
        .copied()
        .collect();
    // Stable sort preserves the original order among equal times
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));
    sorted.dedup_by(|later, earlier| later.time == earlier.time);
    sorted
}

fn lerp(v0: f32, v1: f32, s: f64) -> f32 {
    (v0 as f64 * (1.0 - s) + v1 as f64 * s) as f32
}

/// Index of the segment starting at or before `t` (keyframes must be normalized)
fn segment_index(keyframes: &[VolumeKeyframe], t: f64) -> usize {
    keyframes.partition_point(|k| k.time <= t).saturating_sub(1)
}

fn evaluate_sorted(keyframes: &[VolumeKeyframe], time: f64, base: f32) -> f32 {
    let (first, last) = match (keyframes.first(), keyframes.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return clamp_volume(base),
    };
    if time <= first.time {
        return clamp_volume(first.value);
    }
    if time >= last.time {
        return clamp_volume(last.value);
    }

    let i = segment_index(keyframes, time);
    let (k0, k1) = (&keyframes[i], &keyframes[i + 1]);
    if time == k0.time {
        return clamp_volume(k0.value);
    }
    let u = (time - k0.time) / (k1.time - k0.time);
    let s = k0.curve.shape(u, k0.bezier_controls.as_ref());
    clamp_volume(lerp(k0.value, k1.value, s))
}

/// Volume at `time` given a keyframe list
///
/// Holds the first value before the first keyframe and the last value after
/// the last one. With no keyframes the result is `base`.
pub fn get_volume_at_time(time: f64, keyframes: &[VolumeKeyframe], base: f32) -> f32 {
    evaluate_sorted(&normalize_keyframes(keyframes), time, base)
}

// ============ Rendering ============

/// One segment of the rendered envelope
enum SegmentRenderer {
    Linear { v0: f32, v1: f32 },
    Geometric { v0: f32, v1: f32 },
    Table(Vec<f32>),
}

impl SegmentRenderer {
    fn for_segment(k0: &VolumeKeyframe, k1: &VolumeKeyframe) -> Self {
        let v0 = clamp_volume(k0.value);
        let v1 = clamp_volume(k1.value);
        match k0.curve {
            CurveType::Linear => SegmentRenderer::Linear { v0, v1 },
            CurveType::Exponential => SegmentRenderer::Geometric { v0, v1 },
            curve => {
                let last = (VALUE_CURVE_POINTS - 1) as f64;
                let table = (0..VALUE_CURVE_POINTS)
                    .map(|i| {
                        let s = curve.shape(i as f64 / last, k0.bezier_controls.as_ref());
                        clamp_volume(lerp(v0, v1, s))
                    })
                    .collect();
                SegmentRenderer::Table(table)
            }
        }
    }

    fn value(&self, u: f64) -> f32 {
        match self {
            SegmentRenderer::Linear { v0, v1 } => lerp(*v0, *v1, u),
            SegmentRenderer::Geometric { v0, v1 } => {
                let a = v0.max(EXPONENTIAL_FLOOR) as f64;
                let b = v1.max(EXPONENTIAL_FLOOR) as f64;
                (a * (b / a).powf(u)) as f32
            }
            SegmentRenderer::Table(table) => {
                let pos = u * (table.len() - 1) as f64;
                let i = (pos.floor() as usize).min(table.len() - 2);
                lerp(table[i], table[i + 1], pos - i as f64)
            }
        }
    }
}

/// Per-frame gain envelope for `frames` frames at `sample_rate`
///
/// Keyframe times land on their exact values; between keyframes linear and
/// exponential segments ramp (exponential geometrically) and the other
/// curves interpolate a 128-point sampled table.
pub fn volume_envelope(
    keyframes: &[VolumeKeyframe],
    sample_rate: u32,
    frames: usize,
    base: f32,
) -> Vec<f32> {
    let keyframes = normalize_keyframes(keyframes);
    let (first, last) = match (keyframes.first(), keyframes.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return vec![clamp_volume(base); frames],
    };

    let sr = sample_rate as f64;
    let mut envelope = Vec::with_capacity(frames);
    let mut segment: Option<(usize, SegmentRenderer)> = None;

    for frame in 0..frames {
        let t = frame as f64 / sr;
        if t <= first.time {
            envelope.push(clamp_volume(first.value));
            continue;
        }
        if t >= last.time {
            envelope.push(clamp_volume(last.value));
            continue;
        }
        let i = segment_index(&keyframes, t);
        let (k0, k1) = (&keyframes[i], &keyframes[i + 1]);
        if t == k0.time {
            envelope.push(clamp_volume(k0.value));
            continue;
        }
        if segment.as_ref().map(|(idx, _)| *idx) != Some(i) {
            segment = Some((i, SegmentRenderer::for_segment(k0, k1)));
        }
        let u = (t - k0.time) / (k1.time - k0.time);
        let value = segment.as_ref().map(|(_, r)| r.value(u)).unwrap_or(k0.value);
        envelope.push(clamp_volume(value));
    }
    envelope
}

/// Apply a volume automation envelope to a copy of `buffer`
pub fn apply_volume_automation(
    buffer: &AudioBuffer,
    keyframes: &[VolumeKeyframe],
    base: f32,
) -> AudioBuffer {
    let envelope = volume_envelope(keyframes, buffer.sample_rate(), buffer.num_frames(), base);
    let mut output = buffer.clone();
    for channel in output.channels_mut() {
        for (sample, gain) in channel.iter_mut().zip(&envelope) {
            *sample *= gain;
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    #[test_case(CurveType::Linear ; "linear")]
    #[test_case(CurveType::Exponential ; "exponential")]
    #[test_case(CurveType::Logarithmic ; "logarithmic")]
    #[test_case(CurveType::SCurve ; "s_curve")]
    #[test_case(CurveType::Bezier ; "bezier")]
    fn test_endpoints_are_exact(curve: CurveType) {
        let keyframes = [
            VolumeKeyframe::new(0.5, 0.3).with_curve(curve),
            VolumeKeyframe::new(1.7, 2.9),
        ];
        assert_eq!(get_volume_at_time(0.5, &keyframes, 1.0), 0.3);
        assert_eq!(get_volume_at_time(1.7, &keyframes, 1.0), 2.9);
        assert_eq!(curve.shape(0.0, None), 0.0);
        assert_abs_diff_eq!(curve.shape(1.0, None), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_midpoint_shapes() {
        assert_abs_diff_eq!(CurveType::Linear.shape(0.5, None), 0.5);
        assert_abs_diff_eq!(CurveType::Exponential.shape(0.5, None), 0.25);
        assert_abs_diff_eq!(CurveType::Logarithmic.shape(0.5, None), 5.5_f64.log10(), epsilon = 1e-12);
        assert_abs_diff_eq!(CurveType::SCurve.shape(0.5, None), 0.5);
    }

    #[test]
    fn test_bezier_ignores_x_controls() {
        let a = BezierControls { x1: 0.0, y1: 0.2, x2: 1.0, y2: 0.8 };
        let b = BezierControls { x1: 0.9, y1: 0.2, x2: 0.1, y2: 0.8 };
        assert_eq!(
            CurveType::Bezier.shape(0.3, Some(&a)),
            CurveType::Bezier.shape(0.3, Some(&b))
        );
    }

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(10.0), 4.0);
        assert_eq!(clamp_volume(-5.0), 0.0);
        assert_eq!(clamp_volume(1.5), 1.5);
        assert_eq!(clamp_volume(f32::NAN), 0.0);
    }

    #[test]
    fn test_holds_outside_keyframes() {
        let keyframes = [VolumeKeyframe::new(1.0, 0.5), VolumeKeyframe::new(2.0, 1.5)];
        assert_eq!(get_volume_at_time(0.0, &keyframes, 1.0), 0.5);
        assert_eq!(get_volume_at_time(5.0, &keyframes, 1.0), 1.5);
        assert_eq!(get_volume_at_time(5.0, &[], 0.7), 0.7);
    }

    #[test]
    fn test_duplicate_times_keep_first() {
        let keyframes = [
            VolumeKeyframe::new(1.0, 0.2),
            VolumeKeyframe::new(0.0, 1.0),
            VolumeKeyframe::new(1.0, 0.9),
        ];
        let normalized = normalize_keyframes(&keyframes);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[1].value, 0.2);
    }

    #[test]
    fn test_unsorted_keyframes_are_sorted() {
        let keyframes = [VolumeKeyframe::new(2.0, 0.0), VolumeKeyframe::new(0.0, 2.0)];
        assert_abs_diff_eq!(get_volume_at_time(1.0, &keyframes, 1.0), 1.0, epsilon = 1e-6);
    }

    #[test_case(CurveType::Linear ; "linear")]
    #[test_case(CurveType::Exponential ; "exponential")]
    #[test_case(CurveType::SCurve ; "s_curve")]
    #[test_case(CurveType::Bezier ; "bezier")]
    fn test_envelope_hits_keyframe_values(curve: CurveType) {
        let keyframes = [
            VolumeKeyframe::new(0.0, 1.0).with_curve(curve),
            VolumeKeyframe::new(0.5, 0.0),
            VolumeKeyframe::new(1.0, 2.0),
        ];
        let envelope = volume_envelope(&keyframes, 1000, 1001, 1.0);
        assert_eq!(envelope[0], 1.0);
        assert_eq!(envelope[500], 0.0);
        assert_eq!(envelope[1000], 2.0);
    }

    #[test]
    fn test_sampled_curve_tracks_evaluator() {
        let keyframes = [
            VolumeKeyframe::new(0.0, 0.0).with_curve(CurveType::Logarithmic),
            VolumeKeyframe::new(1.0, 1.0),
        ];
        let envelope = volume_envelope(&keyframes, 1000, 1000, 1.0);
        for frame in (0..1000).step_by(37) {
            let expected = get_volume_at_time(frame as f64 / 1000.0, &keyframes, 1.0);
            assert_abs_diff_eq!(envelope[frame], expected, epsilon = 0.01);
        }
    }

    #[test]
    fn test_apply_automation_scales_buffer() {
        let buffer = AudioBuffer::mono(vec![1.0; 100], 100);
        let keyframes = [VolumeKeyframe::new(0.0, 0.0), VolumeKeyframe::new(0.99, 0.99)];
        let out = apply_volume_automation(&buffer, &keyframes, 1.0);
        assert_eq!(buffer.channel(0)[50], 1.0);
        assert_abs_diff_eq!(out.channel(0)[50], 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_keyframe_json_shape() {
        let json = r#"{"time": 1.0, "value": 0.5, "curve": "s-curve",
            "bezierControls": {"x1": 0.1, "y1": 0.2, "x2": 0.3, "y2": 0.4}}"#;
        let k: VolumeKeyframe = serde_json::from_str(json).unwrap();
        assert_eq!(k.curve, CurveType::SCurve);
        assert_eq!(k.bezier_controls.map(|c| c.y2), Some(0.4));
    }
}
