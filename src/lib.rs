//! # Playlist Radio
//!
//! Live single-program audio broadcast: a fixed playlist of files is
//! played back-to-back at real playback speed and every listener hears
//! the same feed from the moment it tunes in.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          BROADCAST ENGINE                            │
//! │                                                                      │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌──────────────────────┐  │
//! │  │ Track Catalog│──►│   Play Queue     │──►│  Bitrate Resolver    │  │
//! │  │ (list/shuffle)│  │ (refill on loop) │   │ (fixed | probe | 128k)│ │
//! │  └──────────────┘   └──────────────────┘   └──────────┬───────────┘  │
//! │                                                       │              │
//! │                                                       ▼              │
//! │                     ┌────────────────────────────────────────────┐   │
//! │                     │  Pacer: file bytes at bitrate / 8 per sec  │   │
//! │                     └─────────────────────┬──────────────────────┘   │
//! │                                           │ chunks                   │
//! │                                           ▼                          │
//! │                     ┌────────────────────────────────────────────┐   │
//! │                     │        Sink Registry (fan-out)             │   │
//! │                     │   sink 0     sink 1     sink 2    ...      │   │
//! │                     └─────┬──────────┬──────────┬────────────────┘   │
//! └───────────────────────────┼──────────┼──────────┼────────────────────┘
//!                             ▼          ▼          ▼
//!                      ┌─────────────────────────────────┐
//!                      │  HTTP /stream (ui::server)      │
//!                      └─────────────────────────────────┘
//! ```

pub mod bitrate;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod playback;
pub mod sinks;
pub mod ui;

pub use engine::{BroadcastEngine, EngineState};
pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Bitrate used when probing a track fails
    pub const FALLBACK_BITRATE: u32 = 128_000;

    /// Default playable file extension
    pub const DEFAULT_EXTENSION: &str = "mp3";

    /// Default bytes per paced chunk
    pub const DEFAULT_CHUNK_SIZE: usize = 16_384;

    /// Default per-listener queue depth in chunks
    pub const DEFAULT_SINK_BUFFER: usize = 64;

    /// Default HTTP port
    pub const DEFAULT_HTTP_PORT: u16 = 8000;
}
