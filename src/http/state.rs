use crate::session::LoopController;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single loop controller behind this surface
    pub controller: Arc<LoopController>,
}

impl AppState {
    pub fn new(controller: Arc<LoopController>) -> Self {
        Self { controller }
    }
}
