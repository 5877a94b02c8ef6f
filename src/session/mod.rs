//! Capture-upload session management
//!
//! This module provides the `LoopController` abstraction that manages:
//! - The run/stop state machine (Idle → Starting → Running → Stopping)
//! - The single capture-upload loop task and its cancellation
//! - Session identity shared by every upload and flush
//! - The append-only caption log
//! - Observable status for external UIs

mod captions;
mod controller;
mod id;
mod status;

pub use captions::{CaptionEntry, CaptionLog};
pub use controller::{LoopConfig, LoopController, LoopState};
pub use id::SessionId;
pub use status::LoopStatus;
