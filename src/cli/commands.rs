//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::analysis::{detect_silence, measure_loudness};
use crate::engine::media::{DirectoryMediaSource, InMemoryMediaSource, MediaSource};
use crate::engine::{export_wav, import_wav, AudioBuffer, AudioEngine, EngineConfig};
use crate::render::timeline::Project;

/// Load the engine configuration, falling back to defaults
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn start_engine(config: EngineConfig, media: Box<dyn MediaSource>) -> Result<AudioEngine> {
    let mut engine = AudioEngine::new(config, media);
    engine.init().context("failed to initialize audio engine")?;
    Ok(engine)
}

fn read_wav(path: &Path) -> Result<AudioBuffer> {
    import_wav(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_wav(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    export_wav(buffer, path).with_context(|| format!("failed to write {}", path.display()))?;
    println!(
        "Wrote {} ({:.2}s, {} ch, {} Hz)",
        path.display(),
        buffer.duration_secs(),
        buffer.num_channels(),
        buffer.sample_rate()
    );
    Ok(())
}

/// Render a project range to a WAV file.
pub fn render(
    config: EngineConfig,
    project_path: &Path,
    media_dir: &Path,
    start: f64,
    duration: Option<f64>,
    output: &Path,
) -> Result<()> {
    info!("Rendering project: {}", project_path.display());

    let project = Project::from_file(project_path)
        .with_context(|| format!("failed to load project {}", project_path.display()))?;
    let media = DirectoryMediaSource::open(media_dir)
        .with_context(|| format!("failed to index media in {}", media_dir.display()))?;
    info!("Indexed {} media files", media.media_ids().len());

    let duration = duration.unwrap_or_else(|| (project_end(&project) - start).max(0.0));
    let engine = start_engine(config, Box::new(media))?;
    let rendered = engine.render_audio(&project, start, duration)?;

    write_wav(&rendered.buffer, output)
}

fn project_end(project: &Project) -> f64 {
    project
        .tracks
        .iter()
        .flat_map(|track| track.clips.iter())
        .map(|clip| clip.end_time())
        .fold(0.0, f64::max)
}

/// Print tempo and beat grid.
pub fn beats(config: EngineConfig, input: &Path) -> Result<()> {
    let buffer = read_wav(input)?;
    let engine = start_engine(config, Box::new(InMemoryMediaSource::new()))?;
    let result = engine.analyze_audio_buffer(&buffer)?;

    println!("BPM: {:.1}", result.bpm);
    println!("Confidence: {:.2}", result.confidence);
    println!("Beats: {}", result.beats.len());
    for beat in result.beats.iter().take(16) {
        let marker = if result.downbeats.contains(&beat.time) { "*" } else { " " };
        println!("  {} {:>4} {:8.3}s", marker, beat.index, beat.time);
    }
    if result.beats.len() > 16 {
        println!("  ... {} more", result.beats.len() - 16);
    }
    Ok(())
}

/// Print loudness figures.
pub fn loudness(input: &Path) -> Result<()> {
    let buffer = read_wav(input)?;
    let measurement = measure_loudness(&buffer);

    println!("RMS:  {:.2} dB", measurement.rms_db);
    println!("Peak: {:.2} dB", measurement.peak_db);
    println!("LUFS: {:.2} (approximate)", measurement.lufs);
    Ok(())
}

/// Print silent ranges.
pub fn silence(input: &Path, threshold_db: f32) -> Result<()> {
    let buffer = read_wav(input)?;
    let ranges = detect_silence(&buffer, threshold_db);

    if ranges.is_empty() {
        println!("No silence below {:.1} dB", threshold_db);
        return Ok(());
    }
    for range in &ranges {
        println!(
            "{:8.3}s - {:8.3}s ({:.3}s)",
            range.start,
            range.end,
            range.end - range.start
        );
    }
    Ok(())
}

/// Learn a noise profile from one file and reduce it in another.
pub fn denoise(
    config: EngineConfig,
    input: &Path,
    noise: &Path,
    reduction: f32,
    output: &Path,
) -> Result<()> {
    let noise_buffer = read_wav(noise)?;
    let buffer = read_wav(input)?;
    let mut engine = start_engine(config, Box::new(InMemoryMediaSource::new()))?;

    let profile = engine.learn_noise_profile(&noise_buffer, "cli")?;
    info!(
        "Learned noise profile: {} bins at {:.1} Hz",
        profile.magnitudes.len(),
        profile.bin_hz()
    );

    let cleaned = engine.apply_noise_reduction_with_profile(&buffer, "cli", reduction)?;
    write_wav(&cleaned, output)
}

/// Duck a background file under a foreground file.
pub fn duck(config: EngineConfig, background: &Path, foreground: &Path, output: &Path) -> Result<()> {
    let background = read_wav(background)?;
    let foreground = read_wav(foreground)?;
    let engine = start_engine(config, Box::new(InMemoryMediaSource::new()))?;

    let ducked = engine.apply_ducking(&background, &foreground, None, 1.0)?;
    write_wav(&ducked, output)
}
