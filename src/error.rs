//! Error types for the broadcast engine

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Track catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No playable tracks found")]
    Empty,
}

/// State machine contract violations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("Already playing")]
    AlreadyPlaying,

    #[error("Not playing")]
    NotPlaying,
}

/// Bitrate probe failures.
///
/// These never leave the bitrate resolver; they are logged and replaced
/// with the fallback bitrate.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to run probe: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Probe exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Malformed probe output: {0}")]
    Malformed(String),

    #[error("Probe output has no bitrate")]
    MissingBitrate,
}

/// Per-listener write failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    #[error("Listener channel closed")]
    Closed,

    #[error("Listener cannot keep up with the live feed")]
    Lagging,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
