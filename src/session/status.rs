use chrono::{DateTime, Utc};
use serde::Serialize;

use super::controller::LoopState;
use super::id::SessionId;

/// Observable snapshot of the capture loop
///
/// Everything an external UI needs to render: where the state machine is, a
/// human-readable status line, the session identity, counters, and the last
/// raw server response for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    /// Current state of the loop state machine
    pub state: LoopState,

    /// Latest human-readable condition (e.g. "Uploading chunk...")
    pub status: String,

    /// Identity shared by every upload and flush of this controller
    pub session_id: SessionId,

    /// Raw body of the most recent server response, if any
    pub last_response: Option<String>,

    /// Number of chunks recorded so far
    pub chunks_captured: u64,

    /// Number of finalized captions in the log
    pub captions: usize,

    /// When the current (or last) run entered the loop
    pub started_at: Option<DateTime<Utc>>,
}
