//! Engine Integration Tests
//!
//! End-to-end tests through the `AudioEngine` entry point.

use std::collections::BTreeMap;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use test_case::test_case;

use splice::analysis::measure_loudness;
use splice::automation::{lock_ducker, spawn_ducker_task, CurveType, DuckingParams, VolumeKeyframe};
use splice::dsp::{CompressorParams, EQBand, Effect, EffectKind, EqParams};
use splice::engine::{encode_wav_16, export_wav, DirectoryMediaSource, InMemoryMediaSource};
use splice::render::{Clip, Project, TrackProcessorConfig};
use splice::{AudioBuffer, AudioEngine, EngineConfig};

const SR: u32 = 8000;

/// Helper to create a test sine wave buffer
fn create_sine_buffer(frequency: f32, amplitude: f32, seconds: f64, sample_rate: u32) -> AudioBuffer {
    let frames = (seconds * sample_rate as f64) as usize;
    let samples = (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect();
    AudioBuffer::mono(samples, sample_rate)
}

fn create_noise_buffer(amplitude: f32, seconds: f64, sample_rate: u32) -> AudioBuffer {
    // Small LCG so the test needs no RNG dependency of its own
    let frames = (seconds * sample_rate as f64) as usize;
    let mut state: u32 = 0x1234_5678;
    let samples = (0..frames)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            amplitude * ((state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0)
        })
        .collect();
    AudioBuffer::mono(samples, sample_rate)
}

fn engine_with(media: InMemoryMediaSource) -> AudioEngine {
    let config = EngineConfig {
        sample_rate: SR,
        ..EngineConfig::default()
    };
    let mut engine = AudioEngine::new(config, Box::new(media));
    engine.init().unwrap();
    engine
}

fn engine() -> AudioEngine {
    engine_with(InMemoryMediaSource::new())
}

// === Offline rendering ===

#[test]
fn test_render_project_from_json_and_media_dir() {
    let dir = tempfile::tempdir().unwrap();
    export_wav(&AudioBuffer::mono(vec![0.5; SR as usize], SR), &dir.path().join("tone.wav")).unwrap();

    let project = Project::from_json(
        r#"{
            "settings": { "sampleRate": 8000, "channels": 2 },
            "tracks": [
                {
                    "id": "music",
                    "type": "audio",
                    "volume": 1.0,
                    "clips": [
                        { "id": "c1", "mediaId": "tone", "startTime": 0.25, "duration": 0.5 }
                    ]
                },
                { "id": "titles", "type": "text", "clips": [] }
            ]
        }"#,
    )
    .unwrap();

    let media = DirectoryMediaSource::open(dir.path()).unwrap();
    let config = EngineConfig {
        sample_rate: SR,
        ..EngineConfig::default()
    };
    let mut engine = AudioEngine::new(config, Box::new(media));
    engine.init().unwrap();

    let rendered = engine.render_audio(&project, 0.0, 1.0).unwrap();
    assert_eq!(rendered.buffer.num_frames(), 8000);
    assert_eq!(rendered.buffer.num_channels(), 2);
    for channel in rendered.buffer.channels() {
        assert_eq!(channel[1000], 0.0);
        assert_abs_diff_eq!(channel[4000], 0.5, epsilon = 1e-3);
        assert_eq!(channel[7000], 0.0);
    }
}

#[test]
fn test_missing_media_renders_silence_for_that_clip_only() {
    let media = InMemoryMediaSource::new().with("tone", AudioBuffer::mono(vec![0.25; 8000], SR));
    let mut project = Project::default();
    project.settings.sample_rate = SR;
    project.tracks.push(splice::render::Track {
        clips: vec![
            Clip::new("ok", "tone", 0.0, 0.5),
            Clip::new("broken", "missing", 0.5, 0.5),
        ],
        ..splice::render::Track::new("a", splice::render::TrackKind::Audio)
    });

    let engine = engine_with(media);
    let rendered = engine.render_audio(&project, 0.0, 1.0).unwrap();
    let left = rendered.buffer.channel(0);
    assert_abs_diff_eq!(left[2000], 0.25, epsilon = 1e-6);
    assert_eq!(left[6000], 0.0);
}

#[test]
fn test_rendering_a_sub_range_matches_the_full_render() {
    let media = InMemoryMediaSource::new().with("tone", create_sine_buffer(220.0, 0.5, 2.0, SR));
    let mut project = Project::default();
    project.settings.sample_rate = SR;
    project.tracks.push(splice::render::Track {
        clips: vec![Clip::new("c", "tone", 0.0, 1.0)],
        ..splice::render::Track::new("a", splice::render::TrackKind::Audio)
    });

    let engine = engine_with(media);
    let full = engine.render_audio(&project, 0.0, 1.0).unwrap();
    let part = engine.render_audio(&project, 0.5, 0.25).unwrap();
    for i in (0..part.buffer.num_frames()).step_by(97) {
        assert_abs_diff_eq!(
            part.buffer.channel(0)[i],
            full.buffer.channel(0)[4000 + i],
            epsilon = 1e-5
        );
    }
}

fn ramp_project(clip: Clip) -> (InMemoryMediaSource, Project) {
    // Source value equals source time in seconds
    let ramp: Vec<f32> = (0..4 * SR as usize).map(|i| i as f32 / SR as f32).collect();
    let media = InMemoryMediaSource::new().with("ramp", AudioBuffer::mono(ramp, SR));
    let mut project = Project::default();
    project.settings.sample_rate = SR;
    project.tracks.push(splice::render::Track {
        clips: vec![clip],
        ..splice::render::Track::new("a", splice::render::TrackKind::Audio)
    });
    (media, project)
}

#[test]
fn test_mid_clip_range_replays_fade_in() {
    let mut clip = Clip::new("c", "ramp", 0.0, 4.0);
    clip.fade_in = 1.0;
    let (media, project) = ramp_project(clip);

    let rendered = engine_with(media).render_audio(&project, 2.0, 1.0).unwrap();
    let left = rendered.buffer.channel(0);
    assert_eq!(left[0], 0.0);
    // Half way through the fade, source at 2.5s
    assert_abs_diff_eq!(left[4000], 0.5 * 2.5, epsilon = 1e-4);
}

#[test_case(false, 1.0 => 1.0; "forward from the range start")]
#[test_case(false, 1.25 => 1.5; "forward at double speed")]
#[test_case(true, 1.0 => 1.0; "reversed from the range start")]
#[test_case(true, 1.25 => 0.5; "reversed at double speed")]
fn test_source_read_position_with_speed(reversed: bool, at: f64) -> f32 {
    let mut clip = Clip::new("c", "ramp", 0.0, 2.0);
    clip.speed = 2.0;
    clip.reversed = reversed;
    let (media, project) = ramp_project(clip);

    let rendered = engine_with(media).render_audio(&project, 1.0, 0.5).unwrap();
    let frame = ((at - 1.0) * SR as f64).round() as usize;
    let value = rendered.buffer.channel(0)[frame];
    (value * 1e4).round() / 1e4
}

// === Effect chains ===

#[test]
fn test_effect_order_is_significant() {
    let engine = engine();
    let input = create_sine_buffer(100.0, 0.8, 0.5, SR);
    let eq = Effect::new(EffectKind::Eq(EqParams {
        bands: vec![EQBand::low_shelf(200.0, 12.0)],
    }));
    let compressor = Effect::new(EffectKind::Compressor(CompressorParams {
        threshold: -20.0,
        ratio: 8.0,
        ..CompressorParams::default()
    }));

    let eq_first = engine
        .apply_effect_chain(&input, &[eq.clone(), compressor.clone()])
        .unwrap();
    let comp_first = engine.apply_effect_chain(&input, &[compressor, eq]).unwrap();

    assert_eq!(eq_first.applied_effects, vec!["eq", "compressor"]);
    assert_eq!(comp_first.applied_effects, vec!["compressor", "eq"]);

    let diff: f32 = eq_first
        .buffer
        .channel(0)
        .iter()
        .zip(comp_first.buffer.channel(0))
        .map(|(a, b)| (a - b).abs())
        .sum();
    assert!(diff > 1.0, "chains produced near-identical output: {}", diff);
}

#[test]
fn test_effect_chain_json_round_trip() {
    let json = r#"[
        { "id": "e1", "type": "gain", "value": 0.5 },
        { "id": "e2", "type": "shimmer", "amount": 3 },
        { "id": "e3", "type": "pan", "value": 1.0, "enabled": false }
    ]"#;
    let effects: Vec<Effect> = serde_json::from_str(json).unwrap();
    let engine = engine();
    let input = AudioBuffer::mono(vec![1.0; 256], SR);
    let result = engine.apply_effect_chain(&input, &effects).unwrap();
    assert_eq!(result.applied_effects, vec!["gain"]);
    assert_abs_diff_eq!(result.buffer.channel(0)[100], 0.5, epsilon = 1e-6);
}

// === Noise reduction ===

#[test]
fn test_noise_reduction_is_deterministic_and_quieter() {
    let mut engine = engine();
    // Hiss plus mains hum
    let mut noise = create_noise_buffer(0.02, 1.0, SR);
    noise.add_from(&create_sine_buffer(100.0, 0.1, 1.0, SR));
    engine.learn_noise_profile(&noise, "room").unwrap();

    let mut noisy = create_sine_buffer(440.0, 0.5, 1.0, SR);
    noisy.add_from(&noise);

    let a = engine
        .apply_noise_reduction_with_profile(&noisy, "room", 0.8)
        .unwrap();
    let b = engine
        .apply_noise_reduction_with_profile(&noisy, "room", 0.8)
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(a.num_frames(), noisy.num_frames());
    assert!(a.is_finite());

    let cleaned_noise = engine
        .apply_noise_reduction_with_profile(&noise, "room", 0.8)
        .unwrap();
    assert!(measure_loudness(&cleaned_noise).rms_db < measure_loudness(&noise).rms_db);
}

#[test]
fn test_unknown_noise_profile_leaves_engine_usable() {
    let mut engine = engine();
    let buffer = AudioBuffer::mono(vec![0.0; 512], SR);
    let err = engine
        .apply_noise_reduction_with_profile(&buffer, "none", 0.5)
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");

    engine.learn_noise_profile(&create_noise_buffer(0.1, 0.5, SR), "none").unwrap();
    assert!(engine
        .apply_noise_reduction_with_profile(&buffer, "none", 0.5)
        .is_ok());
}

// === Beat analysis ===

#[test]
fn test_click_track_at_120_bpm() {
    let sample_rate = 44100;
    let mut samples = vec![0.0f32; sample_rate as usize * 8];
    for beat in 0..16 {
        samples[beat * sample_rate as usize / 2] = 1.0;
    }
    let blob = encode_wav_16(&AudioBuffer::mono(samples, sample_rate)).unwrap();

    let engine = engine();
    let result = engine.analyze_from_blob(&blob).unwrap();
    assert!((result.bpm - 120.0).abs() <= 2.0, "bpm = {}", result.bpm);
    assert!(result.confidence > 0.8, "confidence = {}", result.confidence);
    assert!(!result.downbeats.is_empty());
}

// === Live mixing graph ===

#[test_case(false, false, false => true; "plain track")]
#[test_case(true, false, false => false; "muted")]
#[test_case(false, true, true => true; "soloed")]
#[test_case(false, false, true => false; "other track soloed")]
#[test_case(true, true, true => false; "muted beats solo")]
fn test_audibility_through_engine(muted: bool, solo: bool, other_solo: bool) -> bool {
    let mut engine = engine();
    engine
        .create_track_processor(TrackProcessorConfig::new("subject"))
        .unwrap();
    engine
        .create_track_processor(TrackProcessorConfig::new("other"))
        .unwrap();
    engine.set_track_muted("subject", muted).unwrap();
    engine.set_track_solo("subject", solo).unwrap();
    engine.set_track_solo("other", other_solo).unwrap();
    engine.get_effective_audibility().unwrap()["subject"]
}

#[test]
fn test_process_block_mixes_audible_tracks() {
    let mut engine = engine();
    engine
        .create_track_processor(TrackProcessorConfig::new("voice"))
        .unwrap();
    engine
        .create_track_processor(TrackProcessorConfig::new("music"))
        .unwrap();
    engine.set_track_volume("music", 0.5).unwrap();

    let mut inputs = BTreeMap::new();
    inputs.insert("voice".to_string(), AudioBuffer::new(2, 512, SR));
    inputs.insert("music".to_string(), AudioBuffer::from_channels(vec![vec![0.4; 512]; 2], SR).unwrap());

    let out = engine.process_block(&inputs).unwrap();
    assert_abs_diff_eq!(out.channel(0)[10], 0.2, epsilon = 1e-6);

    engine.set_track_solo("voice", true).unwrap();
    let out = engine.process_block(&inputs).unwrap();
    assert_eq!(out.channel(0)[10], 0.0);
    assert_eq!(engine.mixing_graph().unwrap().processor("music").unwrap().volume(), 0.5);
}

#[test]
fn test_unknown_track_is_not_found() {
    let mut engine = engine();
    let err = engine.set_track_volume("ghost", 0.5).unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

// === Automation ===

#[test]
fn test_volume_automation_and_fades() {
    let engine = engine();
    let input = AudioBuffer::mono(vec![1.0; SR as usize + 1], SR);

    let keyframes = vec![
        VolumeKeyframe::new(0.0, 0.0),
        VolumeKeyframe::new(1.0, 1.0),
    ];
    let ramped = engine.apply_volume_automation(&input, &keyframes, 1.0).unwrap();
    assert_abs_diff_eq!(ramped.channel(0)[4000], 0.5, epsilon = 1e-4);

    let faded = engine
        .apply_fades(&input, 0.25, 0.25, CurveType::Linear)
        .unwrap();
    assert_eq!(faded.channel(0)[0], 0.0);
    assert_abs_diff_eq!(faded.channel(0)[4000], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(faded.channel(0)[8000], 0.0, epsilon = 1e-6);
}

#[test]
fn test_ducking_lowers_background_under_voice() {
    let engine = engine();
    let background = AudioBuffer::mono(vec![0.5; SR as usize * 3], SR);
    let mut voice = vec![0.0f32; SR as usize * 3];
    let tone = create_sine_buffer(220.0, 0.3, 1.0, SR);
    voice[SR as usize..2 * SR as usize].copy_from_slice(tone.channel(0));
    let foreground = AudioBuffer::mono(voice, SR);

    let ducked = engine
        .apply_ducking(&background, &foreground, None, 1.0)
        .unwrap();
    let reduced = 0.5 * DuckingParams::default().ducked_level(1.0);
    let left = ducked.channel(0);
    assert_abs_diff_eq!(left[SR as usize / 2], 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(left[3 * SR as usize / 2], reduced, epsilon = 1e-4);
    assert_abs_diff_eq!(left[11 * SR as usize / 4], 0.5, epsilon = 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_realtime_ducker_task_follows_voice() {
    let engine = engine();
    let ducker = engine.create_realtime_ducker(None, 1.0).unwrap();
    let ducked = DuckingParams::default().ducked_level(1.0);

    let task = spawn_ducker_task(ducker.clone(), Duration::from_millis(10));
    lock_ducker(&ducker).push_foreground(create_sine_buffer(220.0, 0.3, 0.1, SR).channel(0));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_abs_diff_eq!(lock_ducker(&ducker).gain(), ducked, epsilon = 1e-3);

    lock_ducker(&ducker).push_foreground(&vec![0.0; SR as usize]);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_abs_diff_eq!(lock_ducker(&ducker).gain(), 1.0, epsilon = 1e-3);

    task.stop();
    task.join().await;
}

// === Lifecycle ===

#[test]
fn test_engine_rejects_calls_after_dispose() {
    let mut engine = engine();
    engine.dispose();
    let err = engine
        .apply_ducking(&AudioBuffer::default(), &AudioBuffer::default(), None, 1.0)
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_INITIALIZED");
    assert!(!err.is_recoverable());
}
