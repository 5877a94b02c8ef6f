use tokio::sync::mpsc;

use super::error::CaptureError;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct CaptureBackendConfig {
    /// Target sample rate (frames are converted if the device differs)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for CaptureBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz, what the transcription service expects
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms buffers
        }
    }
}

/// Microphone capture backend trait
///
/// Implementations:
/// - Microphone: cpal input stream (all desktop platforms)
/// - Synthetic: generated tone (demos, integration tests)
///
/// A backend is acquired with `start()` and must be released with `stop()`;
/// the loop controller guarantees at most one acquisition is active.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Check whether the microphone can be used at all.
    ///
    /// `false` means recording must not start (no input device, or the
    /// platform denied access).
    async fn check_permission(&self) -> bool;

    /// Acquire the device and start capturing.
    ///
    /// Returns a channel receiver that will receive audio frames.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Release the device and stop capturing.
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if the backend currently holds the device
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    /// Create a capture backend for the given source
    pub fn create(source: CaptureSource, config: CaptureBackendConfig) -> Box<dyn CaptureBackend> {
        match source {
            CaptureSource::Microphone => Box::new(super::mic::MicrophoneBackend::new(config)),
            CaptureSource::Synthetic => Box::new(super::synthetic::SyntheticBackend::new(config)),
        }
    }
}

/// Capture source type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// Microphone input (all platforms)
    Microphone,
    /// Generated tone (demos, integration tests)
    Synthetic,
}
