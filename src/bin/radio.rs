//! Radio Station Application
//!
//! Broadcasts a directory of audio files to HTTP listeners.
//!
//! Usage: `radio [config.toml]`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playlist_radio::{
    config::AppConfig,
    events::LogObserver,
    ui::WebServer,
    BroadcastEngine,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Playlist Radio");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    tracing::info!(
        "Music directory: {} (shuffle: {}, loop: {})",
        config.station.music_dir.display(),
        config.station.shuffle,
        config.station.loop_playlist
    );
    match config.station.bitrate {
        Some(bitrate) => tracing::info!("Fixed bitrate: {} kbps", bitrate / 1000),
        None => tracing::info!("Bitrate probed per track with {}", config.station.ffprobe_path.display()),
    }

    let engine = Arc::new(BroadcastEngine::from_config(
        &config.station,
        Arc::new(LogObserver),
    ));

    if config.server.autostart {
        engine.start().await.context("Failed to start broadcast")?;
    }

    let web_server = WebServer::new(config.server.clone(), engine.clone(), &config.station.extension);
    tracing::info!(
        "Stream available at http://{}:{}/stream",
        config.server.bind_address,
        config.server.http_port
    );

    web_server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    tracing::info!("Bye");
    Ok(())
}
