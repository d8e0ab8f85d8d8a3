//! Engine state and the active playback snapshot

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::catalog::Track;

/// Lifecycle of a broadcast engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Never started
    #[default]
    Idle,
    /// Producing chunks
    Playing,
    /// Finishing the current track, nothing queued after it
    StoppingGraceful,
    /// Done; `start()` begins a fresh cycle
    Stopped,
}

impl EngineState {
    /// Whether a track is (or may still be) active
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Playing | Self::StoppingGraceful)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::StoppingGraceful => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The track currently being paced out
#[derive(Debug, Clone, Serialize)]
pub struct NowPlaying {
    pub track: Track,
    pub bitrate: u32,
    pub started_at: DateTime<Utc>,
}
