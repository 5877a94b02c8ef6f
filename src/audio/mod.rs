pub mod backend;
pub mod chunk;
pub mod error;
pub mod mic;
pub mod synthetic;

pub use backend::{
    AudioFrame, CaptureBackend, CaptureBackendConfig, CaptureBackendFactory, CaptureSource,
};
pub use chunk::{ChunkArtifact, ChunkRecorder};
pub use error::CaptureError;
pub use mic::MicrophoneBackend;
pub use synthetic::SyntheticBackend;
