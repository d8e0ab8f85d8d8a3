//! Lifecycle events
//!
//! The engine and the sink registry report what they do through an
//! injected [`EngineObserver`] instead of a global logger. The default
//! observer discards everything; [`LogObserver`] forwards to `tracing`.

use std::fmt;

use crate::catalog::Track;
use crate::error::SinkError;
use crate::sinks::SinkId;

/// Why a sink left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The listener went away
    Disconnected,
    /// A write to the sink failed
    WriteFailed(SinkError),
    /// The broadcast ended
    StreamEnded,
}

/// Why playback stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Non-looping playlist ran out of tracks
    Exhausted,
    /// `stop(true)` let the current track finish
    Graceful,
    /// `stop(false)` interrupted the current track
    Immediate,
    /// The catalog could not be refilled
    CatalogFailure,
}

/// Something worth reporting happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    CatalogLoaded { tracks: usize },
    SinkOpened { id: SinkId },
    SinkClosed { id: SinkId, reason: CloseReason },
    TrackStarted { track: Track, bitrate: u32 },
    TrackFinished { track: Track, bytes: u64 },
    Stopped { reason: StopReason },
    Error { message: String },
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CatalogLoaded { tracks } => write!(f, "catalog loaded with {tracks} tracks"),
            Self::SinkOpened { id } => write!(f, "sink {id} opened"),
            Self::SinkClosed { id, reason } => write!(f, "sink {id} closed ({reason:?})"),
            Self::TrackStarted { track, bitrate } => {
                write!(f, "now playing {} at {} kbps", track.name, bitrate / 1000)
            }
            Self::TrackFinished { track, bytes } => {
                write!(f, "finished {} ({} bytes)", track.name, bytes)
            }
            Self::Stopped { reason } => write!(f, "playback stopped ({reason:?})"),
            Self::Error { message } => write!(f, "error: {message}"),
        }
    }
}

/// Consumer of lifecycle events
pub trait EngineObserver: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {
    fn on_event(&self, _event: &EngineEvent) {}
}

/// Writes events to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl EngineObserver for LogObserver {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::Error { .. } => tracing::error!("{}", event),
            EngineEvent::SinkClosed {
                reason: CloseReason::WriteFailed(_),
                ..
            } => tracing::warn!("{}", event),
            EngineEvent::SinkOpened { .. } | EngineEvent::SinkClosed { .. } => {
                tracing::debug!("{}", event)
            }
            _ => tracing::info!("{}", event),
        }
    }
}
