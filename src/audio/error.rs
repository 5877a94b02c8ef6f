use thiserror::Error;

/// Failures on the capture side of the loop.
///
/// Everything except `PermissionDenied` is recoverable: the loop logs it,
/// waits a short throttle delay, and tries the next chunk.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone permission not granted")]
    PermissionDenied,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio encoding error: {0}")]
    Encode(#[from] hound::Error),

    #[error("audio stream closed before the chunk completed")]
    StreamClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
