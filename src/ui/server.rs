//! HTTP server
//!
//! | Path | Description |
//! |------|-------------|
//! | `GET /stream` | Live audio feed, `503` while the station is offline |
//! | `GET /api/status` | Engine state, current track, listener count |
//! | `GET /api/listeners` | Connected listeners |
//! | `POST /api/start` | Start the broadcast |
//! | `POST /api/stop` | Stop, `{ "graceful": bool }` |

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::engine::BroadcastEngine;
use crate::error::{Error, Result};
use crate::ui::handlers;

/// Shared state passed to all request handlers
pub struct AppState {
    pub engine: Arc<BroadcastEngine>,
    pub content_type: &'static str,
    pub started: Instant,
}

/// Web server for listeners and control
pub struct WebServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: ServerConfig, engine: Arc<BroadcastEngine>, extension: &str) -> Self {
        let state = Arc::new(AppState {
            engine,
            content_type: content_type_for(extension),
            started: Instant::now(),
        });
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/stream", get(handlers::stream_audio))
            .route("/api/status", get(handlers::get_status))
            .route("/api/listeners", get(handlers::get_listeners))
            .route("/api/start", post(handlers::start_broadcast))
            .route("/api/stop", post(handlers::stop_broadcast))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    pub fn address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.bind_address, self.config.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address: {}", e)))
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.address()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// Open `/stream` bodies keep graceful shutdown waiting, so the
    /// engine is stopped before the server starts draining connections.
    pub async fn serve_on<F>(self, listener: tokio::net::TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Listening on http://{}", listener.local_addr()?);

        let engine = self.state.engine.clone();
        let shutdown = async move {
            shutdown.await;
            if engine.is_playing() {
                if let Err(e) = engine.stop(false).await {
                    tracing::warn!("Failed to stop broadcast on shutdown: {}", e);
                }
            }
        };

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// MIME type for the configured track extension
pub fn content_type_for(extension: &str) -> &'static str {
    match extension
        .trim_start_matches('.')
        .to_ascii_lowercase()
        .as_str()
    {
        "mp3" => "audio/mpeg",
        "aac" => "audio/aac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}
