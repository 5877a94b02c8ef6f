// Microphone capture backend using cpal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{AudioFrame, CaptureBackend, CaptureBackendConfig};
use super::error::CaptureError;

/// Microphone backend
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread for the
/// duration of one acquisition; frames are forwarded over a tokio channel.
pub struct MicrophoneBackend {
    config: CaptureBackendConfig,
    stop_flag: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    capturing: bool,
}

impl MicrophoneBackend {
    pub fn new(config: CaptureBackendConfig) -> Self {
        Self {
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicrophoneBackend {
    async fn check_permission(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.capturing {
            return Err(CaptureError::Device("already capturing".to_string()));
        }

        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();

        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag = Arc::clone(&stop_flag);

        let target_rate = self.config.target_sample_rate;
        let buffer_ms = self.config.buffer_duration_ms;

        let worker = thread::spawn(move || {
            stream_worker(target_rate, buffer_ms, frame_tx, ready_tx, stop_flag);
        });

        // The worker reports back once the stream is playing (or failed to open).
        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                self.capturing = true;
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(CaptureError::Device("capture thread died during startup".to_string()))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.capturing {
            return Ok(());
        }

        self.stop_flag.store(true, Ordering::SeqCst);

        if let Some(worker) = self.worker.take() {
            // Joining blocks for at most one poll interval of the worker loop.
            let joined = tokio::task::spawn_blocking(move || worker.join()).await;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(_)) => error!("microphone capture thread panicked"),
                Err(e) => error!("failed to join capture thread: {}", e),
            }
        }

        self.capturing = false;
        info!("Microphone released");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

/// Owns the cpal stream on its thread until the stop flag is raised.
fn stream_worker(
    target_rate: u32,
    buffer_ms: u64,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<(), CaptureError>>,
    stop_flag: Arc<AtomicBool>,
) {
    let outcome = open_stream(target_rate, buffer_ms, frame_tx);

    match outcome {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            while !stop_flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(10));
            }
            // Dropping the stream stops the device callbacks.
            drop(stream);
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn open_stream(
    target_rate: u32,
    buffer_ms: u64,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::Device("no input device available".to_string()))?;

    info!("Audio input device: {}", device.name().unwrap_or_default());

    // Prefer a config that supports the target rate; otherwise take the
    // device default and let the chunk recorder convert.
    let mut selected = None;
    let ranges = device
        .supported_input_configs()
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    for range in ranges {
        if range.min_sample_rate().0 <= target_rate && range.max_sample_rate().0 >= target_rate {
            selected = Some(range.with_sample_rate(cpal::SampleRate(target_rate)));
            break;
        }
    }
    let supported = match selected {
        Some(config) => config,
        None => device
            .default_input_config()
            .map_err(|e| CaptureError::Device(e.to_string()))?,
    };

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    info!(
        "Audio config selected: rate={}Hz, channels={}",
        sample_rate, channels
    );

    let frame_len = (sample_rate as u64 * channels as u64 * buffer_ms / 1000) as usize;
    let mut forwarder = FrameForwarder::new(frame_tx, sample_rate, channels, frame_len.max(1));

    let err_fn = |err| error!("audio stream error: {}", err);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &supported.into(),
            move |data: &[f32], _: &_| forwarder.push_f32(data),
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &supported.into(),
            move |data: &[i16], _: &_| forwarder.push_i16(data),
            err_fn,
            None,
        ),
        other => {
            return Err(CaptureError::Device(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| CaptureError::Device(e.to_string()))?;

    stream.play().map_err(|e| CaptureError::Device(e.to_string()))?;

    Ok(stream)
}

/// Accumulates device callbacks into fixed-size frames.
struct FrameForwarder {
    tx: mpsc::Sender<AudioFrame>,
    sample_rate: u32,
    channels: u16,
    frame_len: usize,
    pending: Vec<i16>,
    samples_sent: u64,
}

impl FrameForwarder {
    fn new(tx: mpsc::Sender<AudioFrame>, sample_rate: u32, channels: u16, frame_len: usize) -> Self {
        Self {
            tx,
            sample_rate,
            channels,
            frame_len,
            pending: Vec::with_capacity(frame_len),
            samples_sent: 0,
        }
    }

    fn push_i16(&mut self, data: &[i16]) {
        self.pending.extend_from_slice(data);
        self.drain_frames();
    }

    fn push_f32(&mut self, data: &[f32]) {
        for &sample in data {
            let clamped = sample.clamp(-1.0, 1.0);
            self.pending.push((clamped * i16::MAX as f32) as i16);
        }
        self.drain_frames();
    }

    fn drain_frames(&mut self) {
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            let samples = std::mem::replace(&mut self.pending, rest);

            let timestamp_ms =
                self.samples_sent * 1000 / (self.sample_rate as u64 * self.channels as u64);
            self.samples_sent += samples.len() as u64;

            let frame = AudioFrame {
                samples,
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms,
            };

            // If the consumer falls behind we drop frames (lossy)
            if self.tx.try_send(frame).is_err() {
                warn!("frame channel full, dropping audio frame");
            }
        }
    }
}
