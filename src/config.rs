//! Application configuration
//!
//! Loaded from TOML. Every field has a default, so a partial file (or no file
//! at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub stream: StreamConfig,
}

/// Output device settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device id (`output:<name>`); the default device when unset
    pub device_id: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Fixed callback buffer size in frames; backend default when unset
    pub buffer_size: Option<u32>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            channels: DEFAULT_OUTPUT_CHANNELS,
            buffer_size: None,
        }
    }
}

/// Music streaming settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Samples (all channels) decoded into each stream buffer
    pub chunk_samples: usize,
    pub default_volume: f32,
    pub loop_by_default: bool,
    /// How often the host should call `tick()`
    pub tick_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_samples: MUSIC_BUFFER_SAMPLES,
            default_volume: DEFAULT_VOLUME,
            loop_by_default: true,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_samples == 0 || self.chunk_samples % 2 != 0 {
            return Err(Error::Config(format!(
                "chunk_samples must be a positive even number, got {}",
                self.chunk_samples
            )));
        }
        if !self.default_volume.is_finite() || self.default_volume < 0.0 {
            return Err(Error::Config(format!(
                "default_volume must be >= 0, got {}",
                self.default_volume
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::Config("tick_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load from the default location, falling back to defaults when the file
    /// is missing or invalid
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Ignoring config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Platform config location, e.g. `~/.config/music-streamer/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "music-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=2).contains(&self.audio.channels) {
            return Err(Error::Config(format!(
                "audio.channels must be 1 or 2, got {}",
                self.audio.channels
            )));
        }
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be > 0".to_string()));
        }
        self.stream.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream.chunk_samples, 4096 * 8);
        assert!(config.stream.loop_by_default);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [stream]
            chunk_samples = 8192
            default_volume = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.stream.chunk_samples, 8192);
        assert_eq!(config.stream.default_volume, 0.5);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_rejects_odd_chunk() {
        let err = AppConfig::from_toml("[stream]\nchunk_samples = 1001\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.audio.device_id = Some("output:Speakers".to_string());
        config.stream.loop_by_default = false;
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }
}
