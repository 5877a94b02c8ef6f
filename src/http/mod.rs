//! HTTP control surface for the external UI
//!
//! This module provides a REST API for driving the capture loop:
//! - POST /capture/start - Start the capture loop
//! - POST /capture/stop - Stop the capture loop
//! - POST /capture/flush - Finalize buffered audio for the session
//! - GET /capture/status - Observable loop snapshot
//! - GET /capture/captions - Ordered caption log
//! - GET /health - Health check
//!
//! The UI polls/observes these; it owns no loop state itself.

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
