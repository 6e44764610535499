//! Engine configuration.
//!
//! Stored as JSON under the platform config directory
//! (`<config_dir>/trackdeck/config.json`). Every field has a default, so a
//! partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::defaults;
use crate::error::{Result, TrackdeckError};
use crate::format::AudioFormat;

const CONFIG_DIR: &str = "trackdeck";
const CONFIG_FILE: &str = "config.json";

/// Tunables for the playback and mixdown engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Padding (seconds) appended after the last clip so the transport can
    /// run past the content. Excluded from exports.
    pub trailing_margin: f64,
    /// Largest number of frames rendered per offline render call.
    pub max_render_frames: usize,
    /// Source frames averaged into one envelope value.
    pub envelope_compression: usize,
    /// Seconds moved by forward/backward transport nudges.
    pub seek_step: f64,
    /// Mix sample rate used when no output device dictates one.
    pub output_sample_rate: u32,
    /// Mix channel count used when no output device dictates one.
    pub output_channels: u16,
    /// Maximum undo history depth.
    pub undo_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trailing_margin: defaults::TRAILING_MARGIN,
            max_render_frames: defaults::MAX_RENDER_FRAMES,
            envelope_compression: defaults::ENVELOPE_COMPRESSION,
            seek_step: 15.0,
            output_sample_rate: 48_000,
            output_channels: 2,
            undo_depth: 200,
        }
    }
}

impl EngineConfig {
    /// Float mix format derived from the configured rate and channel count.
    pub fn mix_format(&self) -> AudioFormat {
        AudioFormat::float(self.output_sample_rate, self.output_channels)
    }

    /// Default config file location, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Parse a config from JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(data)
            .map_err(|e| TrackdeckError::Serialization(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    /// Load the config from the default location, falling back to defaults
    /// when there is no file. A file that exists but fails to parse is an error.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Write the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| TrackdeckError::Serialization(format!("Failed to write config: {}", e)))?;
        std::fs::write(path, data)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_render_frames == 0 {
            return Err(TrackdeckError::InvalidParameter(
                "max_render_frames must be positive".into(),
            ));
        }
        if self.output_sample_rate == 0 || self.output_channels == 0 {
            return Err(TrackdeckError::InvalidParameter(
                "output format must have a sample rate and channels".into(),
            ));
        }
        if !(self.trailing_margin.is_finite() && self.trailing_margin >= 0.0) {
            return Err(TrackdeckError::InvalidParameter(
                "trailing_margin must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}
