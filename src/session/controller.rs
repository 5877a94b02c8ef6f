use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::captions::CaptionLog;
use super::id::SessionId;
use super::status::LoopStatus;
use crate::audio::{CaptureBackend, CaptureError, ChunkRecorder};
use crate::upload::{TranscribeClient, UploadReply, UploadResult};

/// Where the capture loop currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Tunables for the capture loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Length of each recorded chunk
    pub chunk_duration: Duration,
    /// Pause after a capture failure before the next attempt
    pub capture_retry_delay: Duration,
    /// Directory for transient chunk artifacts
    pub spool_dir: PathBuf,
    /// Sample rate chunks are written at
    pub sample_rate: u32,
    /// Channel count chunks are written at
    pub channels: u16,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            chunk_duration: Duration::from_millis(1400),
            capture_retry_delay: Duration::from_millis(300),
            spool_dir: std::env::temp_dir().join("caption-relay"),
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// Orchestrates the capture-upload loop
///
/// Owns the session identity, the capture backend, the caption log, and the
/// run/stop state machine. One long-lived task executes the loop body; within
/// an iteration capture completes before upload begins and upload completes
/// (including artifact deletion) before the next capture, so the microphone is
/// held by at most one recording and chunks reach the service in recording
/// order. `flush()` runs independently of the loop and only shares the
/// caption log with it.
pub struct LoopController {
    session_id: SessionId,
    config: LoopConfig,

    /// Capture backend; the lock is held by the run task for a whole run
    backend: Mutex<Box<dyn CaptureBackend>>,

    /// Chunk recorder; chunk numbering continues across runs
    recorder: Mutex<ChunkRecorder>,

    client: TranscribeClient,
    captions: CaptionLog,

    /// State machine, observable via `subscribe_state`
    state_tx: watch::Sender<LoopState>,

    /// Human-readable status line, observable via `subscribe_status`
    status_tx: watch::Sender<String>,

    /// Raw body of the most recent server response
    last_response: Mutex<Option<String>>,

    /// Cancellation token for the current run
    cancel: Mutex<CancellationToken>,

    /// Handle for the run task
    task: Mutex<Option<JoinHandle<()>>>,

    chunks_captured: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl LoopController {
    /// Create a controller with a fresh session identity.
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        client: TranscribeClient,
        config: LoopConfig,
    ) -> Result<Arc<Self>, CaptureError> {
        let session_id = SessionId::generate();

        let recorder = ChunkRecorder::new(
            config.spool_dir.clone(),
            session_id.to_string(),
            config.sample_rate,
            config.channels,
        )?;

        info!("Loop controller created: session {}", session_id);

        let (state_tx, _) = watch::channel(LoopState::Idle);
        let (status_tx, _) = watch::channel(String::new());

        Ok(Arc::new(Self {
            session_id,
            config,
            backend: Mutex::new(backend),
            recorder: Mutex::new(recorder),
            client,
            captions: CaptionLog::new(),
            state_tx,
            status_tx,
            last_response: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
            chunks_captured: AtomicU64::new(0),
            started_at: Mutex::new(None),
        }))
    }

    /// Start the capture loop.
    ///
    /// Idempotent: a second call while `Starting` or `Running` does nothing,
    /// and a call during `Stopping` is ignored until the loop reaches `Idle`.
    /// If microphone permission is not granted the controller returns to
    /// `Idle` without ever entering the loop.
    pub async fn start(self: &Arc<Self>) {
        let claimed = self.state_tx.send_if_modified(|state| {
            if *state == LoopState::Idle {
                *state = LoopState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!("start ignored: loop is {:?}", self.state());
            return;
        }

        // Permission gate: never enter Running without it
        let permitted = self.backend.lock().await.check_permission().await;
        if !permitted {
            warn!("Microphone permission not granted");
            self.set_status("Microphone permission not granted");
            self.state_tx.send_replace(LoopState::Idle);
            return;
        }

        // Fresh token per run so an earlier stop cannot poison this one
        let cancel = CancellationToken::new();
        *self.cancel.lock().await = cancel.clone();
        *self.started_at.lock().await = Some(Utc::now());

        let controller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            controller.run_loop(cancel).await;
        });
        *self.task.lock().await = Some(handle);

        self.state_tx.send_replace(LoopState::Running);
        self.set_status("Running");
        info!("Capture loop started: session {}", self.session_id);
    }

    /// Request a cooperative stop and wait for the loop to reach `Idle`.
    ///
    /// An in-flight capture observes the signal within roughly one chunk
    /// duration and releases the microphone; an in-flight upload is allowed to
    /// complete so its artifact is still deleted and its transcript kept.
    pub async fn stop(&self) {
        let accepted = self.state_tx.send_if_modified(|state| {
            if *state == LoopState::Running {
                *state = LoopState::Stopping;
                true
            } else {
                false
            }
        });
        if !accepted {
            debug!("stop ignored: loop is {:?}", self.state());
            return;
        }

        self.set_status("Stopping");
        self.cancel.lock().await.cancel();

        let handle = self.task.lock().await.take();
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    // The task can no longer publish Idle itself
                    error!("Capture loop task panicked: {}", e);
                    self.state_tx.send_replace(LoopState::Idle);
                    self.set_status("Stopped");
                }
            }
            None => {
                self.state_tx.send_replace(LoopState::Idle);
                self.set_status("Stopped");
            }
        }
    }

    /// Ask the service to finalize buffered audio for this session.
    ///
    /// Runs concurrently with the loop at any state and never changes
    /// `LoopState`; a returned transcript is appended to the caption log.
    pub async fn flush(&self) {
        info!("Flushing session {}", self.session_id);
        self.set_status("Flushing session...");

        let reply = self.client.flush(&self.session_id).await;
        self.apply_reply(reply, "Flush done", "Flush error").await;
    }

    /// The single loop task: capture, then upload, strictly in sequence.
    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut backend = self.backend.lock().await;
        let mut recorder = self.recorder.lock().await;

        while !cancel.is_cancelled() {
            let captured = recorder
                .capture_chunk(backend.as_mut(), self.config.chunk_duration, &cancel)
                .await;

            match captured {
                Ok(Some(artifact)) => {
                    self.chunks_captured.fetch_add(1, Ordering::SeqCst);
                    self.set_status("Uploading chunk...");

                    let reply = self.client.upload_chunk(artifact, &self.session_id).await;
                    self.apply_reply(reply, "Chunk uploaded", "Upload failed").await;
                }
                // Cancelled mid-capture; the partial chunk is already gone
                Ok(None) => break,
                Err(e) => {
                    warn!("Recording error: {}", e);
                    self.set_status("Recording error");

                    // Brief pause so a failing device cannot spin the loop
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.capture_retry_delay) => {}
                    }
                }
            }
        }

        drop(recorder);
        drop(backend);

        self.state_tx.send_replace(LoopState::Idle);
        self.set_status("Stopped");
        info!("Capture loop stopped: session {}", self.session_id);
    }

    async fn apply_reply(&self, reply: UploadReply, ok_status: &str, fail_prefix: &str) {
        *self.last_response.lock().await = Some(reply.body);

        match reply.result {
            UploadResult::Interim => self.set_status(ok_status),
            UploadResult::Final { transcript } => {
                let sequence = self.captions.append_final(transcript).await;
                debug!("Caption {} appended", sequence);
                self.set_status(ok_status);
            }
            UploadResult::Failed { reason } => {
                self.set_status(&format!("{}: {}", fail_prefix, reason));
            }
        }
    }

    fn set_status(&self, status: &str) {
        self.status_tx.send_replace(status.to_string());
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> LoopState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions (Idle/Starting/Running/Stopping)
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state_tx.subscribe()
    }

    pub fn status_message(&self) -> String {
        self.status_tx.borrow().clone()
    }

    /// Watch the human-readable status line
    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.status_tx.subscribe()
    }

    pub async fn last_response(&self) -> Option<String> {
        self.last_response.lock().await.clone()
    }

    pub fn captions(&self) -> &CaptionLog {
        &self.captions
    }

    /// Full observable snapshot for the UI
    pub async fn status(&self) -> LoopStatus {
        LoopStatus {
            state: self.state(),
            status: self.status_message(),
            session_id: self.session_id.clone(),
            last_response: self.last_response().await,
            chunks_captured: self.chunks_captured.load(Ordering::SeqCst),
            captions: self.captions.len().await,
            started_at: *self.started_at.lock().await,
        }
    }
}
