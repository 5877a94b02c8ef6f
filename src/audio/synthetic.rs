// Synthetic capture backend: generates a steady tone instead of touching a
// real device. Used by the demo mode and the integration tests.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::backend::{AudioFrame, CaptureBackend, CaptureBackendConfig};
use super::error::CaptureError;

const TONE_HZ: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 0.2;

pub struct SyntheticBackend {
    config: CaptureBackendConfig,
    stopped: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    capturing: bool,
}

impl SyntheticBackend {
    pub fn new(config: CaptureBackendConfig) -> Self {
        Self {
            config,
            stopped: Arc::new(AtomicBool::new(false)),
            task: None,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for SyntheticBackend {
    async fn check_permission(&self) -> bool {
        true
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.capturing {
            return Err(CaptureError::Device("already capturing".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);

        let stopped = Arc::new(AtomicBool::new(false));
        self.stopped = Arc::clone(&stopped);

        let sample_rate = self.config.target_sample_rate;
        let channels = self.config.target_channels;
        let frame_ms = self.config.buffer_duration_ms.max(1);
        let samples_per_frame = (sample_rate as u64 * channels as u64 * frame_ms / 1000) as usize;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
            let mut phase: f32 = 0.0;
            let phase_step = TAU * TONE_HZ / sample_rate as f32;
            let mut frame_index: u64 = 0;

            loop {
                ticker.tick().await;
                if stopped.load(Ordering::SeqCst) {
                    break;
                }

                let mut samples = Vec::with_capacity(samples_per_frame);
                for _ in 0..samples_per_frame / channels as usize {
                    let value = (phase.sin() * TONE_AMPLITUDE * i16::MAX as f32) as i16;
                    phase = (phase + phase_step) % TAU;
                    for _ in 0..channels {
                        samples.push(value);
                    }
                }

                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    channels,
                    timestamp_ms: frame_index * frame_ms,
                };
                frame_index += 1;

                if tx.send(frame).await.is_err() {
                    // Receiver dropped, nothing left to feed
                    break;
                }
            }

            debug!("synthetic capture task stopped");
        });

        self.task = Some(task);
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.capturing {
            return Ok(());
        }

        self.stopped.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("synthetic capture task panicked: {}", e);
            }
        }

        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
