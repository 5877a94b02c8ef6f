use super::state::AppState;
use crate::session::{CaptionEntry, LoopState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::info;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub state: LoopState,
    pub status: String,
    pub session_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /capture/start
/// Start the capture loop (idempotent)
pub async fn start_capture(State(state): State<AppState>) -> impl IntoResponse {
    info!("Start requested");
    state.controller.start().await;
    control_response(&state)
}

/// POST /capture/stop
/// Stop the capture loop and wait for it to reach idle
pub async fn stop_capture(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stop requested");
    state.controller.stop().await;
    control_response(&state)
}

/// POST /capture/flush
/// Ask the service to finalize buffered audio for the session
pub async fn flush_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Flush requested");
    state.controller.flush().await;
    control_response(&state)
}

/// GET /capture/status
/// Full observable snapshot of the loop
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

/// GET /capture/captions
/// Ordered caption log snapshot
pub async fn get_captions(State(state): State<AppState>) -> impl IntoResponse {
    let captions: Vec<CaptionEntry> = state.controller.captions().snapshot().await;
    Json(captions)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn control_response(state: &AppState) -> (StatusCode, Json<ControlResponse>) {
    let controller = &state.controller;
    (
        StatusCode::OK,
        Json(ControlResponse {
            state: controller.state(),
            status: controller.status_message(),
            session_id: controller.session_id().to_string(),
        }),
    )
}
