//! Engine configuration
//!
//! Loaded from JSON (or built from defaults) and validated once at engine
//! init.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::beat::BeatConfig;
use crate::automation::ducking::DuckingParams;
use crate::error::{Result, SpliceError};

/// Frames per block when effect chains process a render
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Framing used when learning noise profiles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseProfileConfig {
    /// FFT frame size in samples (power of two)
    pub frame_size: usize,
    /// Hop between frames in samples
    pub hop_size: usize,
}

impl Default for NoiseProfileConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 1024,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate for renders and the mixing graph
    pub sample_rate: u32,
    /// Output channel count
    pub channels: usize,
    /// Frames per block when effect chains process a render
    pub block_size: usize,
    pub noise_profile: NoiseProfileConfig,
    pub beat: BeatConfig,
    pub ducking: DuckingParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            block_size: DEFAULT_BLOCK_SIZE,
            noise_profile: NoiseProfileConfig::default(),
            beat: BeatConfig::default(),
            ducking: DuckingParams::default(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SpliceError::validation("sample_rate must be non-zero"));
        }
        if self.channels == 0 {
            return Err(SpliceError::validation("channels must be non-zero"));
        }
        if self.block_size == 0 {
            return Err(SpliceError::validation("block_size must be non-zero"));
        }
        let frame = self.noise_profile.frame_size;
        if frame < 2 || !frame.is_power_of_two() {
            return Err(SpliceError::validation(format!(
                "noise profile frame size {} is not a power of two",
                frame
            )));
        }
        if self.noise_profile.hop_size == 0 {
            return Err(SpliceError::validation("noise profile hop size must be non-zero"));
        }
        if self.beat.hop_size == 0 || self.beat.window_size == 0 {
            return Err(SpliceError::validation("beat window and hop must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"sample_rate": 44100, "noise_profile": {"hop_size": 512}}"#)
                .unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.channels, 2);
        assert_eq!(
            config.noise_profile,
            NoiseProfileConfig {
                frame_size: 2048,
                hop_size: 512
            }
        );
    }

    #[test]
    fn test_rejects_non_power_of_two_frame() {
        let mut config = EngineConfig::default();
        config.noise_profile.frame_size = 1000;
        assert_eq!(config.validate().unwrap_err().error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_rejects_zero_block_size() {
        let config: EngineConfig = serde_json::from_str(r#"{"block_size": 0}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"channels": 1}"#).unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.channels, 1);
    }
}
