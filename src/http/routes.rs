use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Loop control
        .route("/capture/start", post(handlers::start_capture))
        .route("/capture/stop", post(handlers::stop_capture))
        .route("/capture/flush", post(handlers::flush_session))
        // Observation
        .route("/capture/status", get(handlers::get_status))
        .route("/capture/captions", get(handlers::get_captions))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // Browser UIs poll this surface from another origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
