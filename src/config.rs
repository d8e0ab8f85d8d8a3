//! Application configuration
//!
//! Loaded from a TOML file; every field falls back to a default so a
//! partial (or missing) file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub station: StationConfig,
    pub server: ServerConfig,
}

/// Playlist and pacing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Directory holding the audio files
    pub music_dir: PathBuf,
    /// File extension of playable tracks (matched case-insensitively)
    pub extension: String,
    /// Shuffle the play order on every catalog listing
    pub shuffle: bool,
    /// Re-list and keep playing when the queue runs out
    pub loop_playlist: bool,
    /// Fixed bitrate in bits per second; probed per track when unset
    pub bitrate: Option<u32>,
    /// Bytes per paced chunk
    pub chunk_size: usize,
    /// Chunks a listener may have queued before it is dropped
    pub sink_buffer: usize,
    /// Bitrate probe executable
    pub ffprobe_path: PathBuf,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            music_dir: PathBuf::from("./music"),
            extension: DEFAULT_EXTENSION.to_string(),
            shuffle: false,
            loop_playlist: true,
            bitrate: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sink_buffer: DEFAULT_SINK_BUFFER,
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Start broadcasting as soon as the process is up
    pub autostart: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            autostart: true,
        }
    }
}

impl AppConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load from `path` if given, else from the platform config directory,
    /// else fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// `config.toml` inside the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "playlist-radio")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Serialize back to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.station.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than 0".into()));
        }
        if self.station.sink_buffer == 0 {
            return Err(Error::Config("sink_buffer must be greater than 0".into()));
        }
        if self.station.bitrate == Some(0) {
            return Err(Error::Config("bitrate must be greater than 0".into()));
        }
        Ok(())
    }
}
