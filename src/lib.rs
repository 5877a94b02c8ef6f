pub mod audio;
pub mod config;
pub mod http;
pub mod session;
pub mod upload;

pub use audio::{
    AudioFrame, CaptureBackend, CaptureBackendConfig, CaptureBackendFactory, CaptureError,
    CaptureSource, ChunkArtifact, ChunkRecorder, MicrophoneBackend, SyntheticBackend,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{
    CaptionEntry, CaptionLog, LoopConfig, LoopController, LoopState, LoopStatus, SessionId,
};
pub use upload::{TranscribeClient, UploadReply, UploadResult};
