//! HTTP API handlers

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;

use crate::engine::{EngineState, NowPlaying};
use crate::error::{EngineError, Error};
use crate::sinks::SinkInfo;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Station status
#[derive(serde::Serialize)]
pub struct StationStatus {
    pub state: EngineState,
    pub now_playing: Option<NowPlaying>,
    pub listeners: usize,
    pub uptime_seconds: u64,
}

/// Stop request body
#[derive(serde::Deserialize)]
pub struct StopRequest {
    #[serde(default = "default_graceful")]
    pub graceful: bool,
}

fn default_graceful() -> bool {
    true
}

fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::Engine(EngineError::AlreadyPlaying | EngineError::NotPlaying) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Live audio feed
pub async fn stream_audio(State(state): State<Arc<AppState>>) -> Response {
    let Some((id, listener)) = state.engine.join_live() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Station is offline").into_response();
    };
    tracing::debug!("Listener {} tuned in", id);

    let body = Body::from_stream(listener.map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, state.content_type),
            (header::CACHE_CONTROL, "no-cache, no-store"),
        ],
        body,
    )
        .into_response()
}

/// Get station status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StationStatus>> {
    let status = StationStatus {
        state: state.engine.state(),
        now_playing: state.engine.now_playing(),
        listeners: state.engine.listener_count(),
        uptime_seconds: state.started.elapsed().as_secs(),
    };

    Json(ApiResponse::ok(status))
}

/// Get connected listeners
pub async fn get_listeners(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<SinkInfo>>> {
    Json(ApiResponse::ok(state.engine.sinks().snapshot()))
}

/// Start the broadcast
pub async fn start_broadcast(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<()>>) {
    match state.engine.start().await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok(()))),
        Err(e) => (error_status(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

/// Stop the broadcast
pub async fn stop_broadcast(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StopRequest>,
) -> (StatusCode, Json<ApiResponse<()>>) {
    match state.engine.stop(req.graceful).await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok(()))),
        Err(e) => (error_status(&e), Json(ApiResponse::error(e.to_string()))),
    }
}
