// Integration tests for the capture-upload loop controller
//
// A scripted axum server stands in for the transcription service and a probed
// synthetic backend stands in for the microphone, so the tests can observe
// device acquisitions, upload ordering, and state transitions end to end.

use anyhow::Result;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use caption_relay::audio::{
    AudioFrame, CaptureBackend, CaptureBackendConfig, CaptureError, SyntheticBackend,
};
use caption_relay::{LoopConfig, LoopController, LoopState, TranscribeClient};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;

// ============================================================================
// Scripted transcription service
// ============================================================================

#[derive(Clone)]
enum Reply {
    Interim,
    Final(String),
}

#[derive(Default)]
struct ServiceInner {
    /// Scripted chunk replies; when exhausted the service answers "interim"
    script: VecDeque<Reply>,
    /// Every chunk upload answers 500 when set
    fail_all: bool,
    /// Body returned by the flush endpoint
    flush_body: String,
    chunk_requests: usize,
    chunk_sessions: Vec<String>,
    flush_sessions: Vec<String>,
}

#[derive(Clone)]
struct Service {
    inner: Arc<Mutex<ServiceInner>>,
}

impl Service {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ServiceInner {
                flush_body: "{}".to_string(),
                ..Default::default()
            })),
        }
    }

    fn script(&self, replies: Vec<Reply>) {
        self.inner.lock().unwrap().script = replies.into();
    }

    fn fail_all(&self) {
        self.inner.lock().unwrap().fail_all = true;
    }

    fn flush_body(&self, body: &str) {
        self.inner.lock().unwrap().flush_body = body.to_string();
    }

    fn chunk_requests(&self) -> usize {
        self.inner.lock().unwrap().chunk_requests
    }

    fn chunk_sessions(&self) -> Vec<String> {
        self.inner.lock().unwrap().chunk_sessions.clone()
    }

    fn flush_sessions(&self) -> Vec<String> {
        self.inner.lock().unwrap().flush_sessions.clone()
    }
}

async fn chunk_endpoint(State(service): State<Service>, mut multipart: Multipart) -> Response {
    let mut session = None;
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("session_id") {
            session = Some(field.text().await.unwrap());
        } else {
            let _ = field.bytes().await;
        }
    }

    let mut inner = service.inner.lock().unwrap();
    inner.chunk_requests += 1;
    if let Some(session) = session {
        inner.chunk_sessions.push(session);
    }

    if inner.fail_all {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream failure").into_response();
    }

    match inner.script.pop_front() {
        Some(Reply::Final(transcript)) => {
            Json(json!({"status": "final", "transcript": transcript})).into_response()
        }
        Some(Reply::Interim) | None => Json(json!({"status": "interim"})).into_response(),
    }
}

async fn flush_endpoint(State(service): State<Service>, Json(body): Json<Value>) -> Response {
    let mut inner = service.inner.lock().unwrap();
    if let Some(session) = body["session_id"].as_str() {
        inner.flush_sessions.push(session.to_string());
    }
    (StatusCode::OK, inner.flush_body.clone()).into_response()
}

async fn spawn_service(service: Service) -> Result<String> {
    let router = Router::new()
        .route("/api/chunk", post(chunk_endpoint))
        .route("/api/flush", post(flush_endpoint))
        .with_state(service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Ok(format!("http://{}", addr))
}

// ============================================================================
// Probed capture backend
// ============================================================================

/// Counters shared with the test so device usage can be asserted
#[derive(Clone, Default)]
struct Probe {
    starts: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Probe {
    fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Synthetic backend that records every acquisition and release
struct ProbeBackend {
    inner: SyntheticBackend,
    probe: Probe,
}

impl ProbeBackend {
    fn new(probe: Probe) -> Self {
        Self {
            inner: SyntheticBackend::new(CaptureBackendConfig {
                target_sample_rate: 16000,
                target_channels: 1,
                buffer_duration_ms: 20,
            }),
            probe,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ProbeBackend {
    async fn check_permission(&self) -> bool {
        true
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        let rx = self.inner.start().await?;
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        let active = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(active, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if self.inner.is_capturing() {
            self.inner.stop().await?;
            self.probe.active.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.inner.is_capturing()
    }

    fn name(&self) -> &str {
        "probe"
    }
}

/// Backend standing in for a platform that refused microphone access
struct DeniedBackend;

#[async_trait::async_trait]
impl CaptureBackend for DeniedBackend {
    async fn check_permission(&self) -> bool {
        false
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        Err(CaptureError::PermissionDenied)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "denied"
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn controller_with(
    base: &str,
    backend: Box<dyn CaptureBackend>,
    spool: &TempDir,
    chunk_ms: u64,
) -> Result<Arc<LoopController>> {
    let client = TranscribeClient::new(
        format!("{}/api/chunk", base),
        format!("{}/api/flush", base),
    );

    let controller = LoopController::new(
        backend,
        client,
        LoopConfig {
            chunk_duration: Duration::from_millis(chunk_ms),
            capture_retry_delay: Duration::from_millis(50),
            spool_dir: spool.path().to_path_buf(),
            sample_rate: 16000,
            channels: 1,
        },
    )?;
    Ok(controller)
}

async fn wait_for_requests(service: &Service, n: usize, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if service.chunk_requests() >= n {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn wait_for_captions(controller: &LoopController, n: usize, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if controller.captions().len().await >= n {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn wait_for_status(controller: &LoopController, wanted: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if controller.status_message() == wanted {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn spool_is_empty(spool: &TempDir) -> Result<bool> {
    Ok(fs::read_dir(spool.path())?.next().is_none())
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_denied_permission_leaves_loop_idle() -> Result<()> {
    let service = Service::new();
    let base = spawn_service(service.clone()).await?;
    let spool = TempDir::new()?;

    let controller = controller_with(&base, Box::new(DeniedBackend), &spool, 50)?;
    controller.start().await;

    assert_eq!(controller.state(), LoopState::Idle);
    assert_eq!(
        controller.status_message(),
        "Microphone permission not granted"
    );
    assert!(controller.captions().is_empty().await);

    // No capture means no uploads
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(service.chunk_requests(), 0);

    Ok(())
}

#[tokio::test]
async fn test_final_transcript_is_appended_once() -> Result<()> {
    let service = Service::new();
    service.script(vec![
        Reply::Interim,
        Reply::Interim,
        Reply::Final("hello world".to_string()),
    ]);
    let base = spawn_service(service.clone()).await?;
    let spool = TempDir::new()?;

    let probe = Probe::default();
    let controller = controller_with(&base, Box::new(ProbeBackend::new(probe.clone())), &spool, 50)?;

    controller.start().await;
    assert_eq!(controller.state(), LoopState::Running);

    assert!(
        wait_for_requests(&service, 3, Duration::from_secs(5)).await,
        "Loop should upload three chunks"
    );
    assert!(
        wait_for_captions(&controller, 1, Duration::from_secs(5)).await,
        "The final transcript should be appended"
    );

    let captions = controller.captions().snapshot().await;
    assert_eq!(captions.len(), 1, "Interim results must not append captions");
    assert_eq!(captions[0].text, "hello world");
    assert_eq!(captions[0].sequence, 0);

    // The device was never double-acquired
    assert_eq!(probe.max_active(), 1);

    controller.stop().await;
    assert_eq!(controller.state(), LoopState::Idle);
    assert_eq!(probe.active(), 0, "Device must be released after stop");
    assert!(spool_is_empty(&spool)?, "Every artifact must be deleted");

    Ok(())
}

#[tokio::test]
async fn test_server_errors_do_not_stop_the_loop() -> Result<()> {
    let service = Service::new();
    service.fail_all();
    let base = spawn_service(service.clone()).await?;
    let spool = TempDir::new()?;

    let probe = Probe::default();
    let controller = controller_with(&base, Box::new(ProbeBackend::new(probe.clone())), &spool, 50)?;

    controller.start().await;

    // The loop keeps recording and uploading after failures
    assert!(
        wait_for_requests(&service, 3, Duration::from_secs(5)).await,
        "Loop should survive failed uploads"
    );
    assert!(
        wait_for_status(&controller, "Upload failed: 500", Duration::from_secs(5)).await,
        "Status should reflect the failure, got {:?}",
        controller.status_message()
    );
    assert!(controller.captions().is_empty().await);

    controller.stop().await;
    assert_eq!(controller.state(), LoopState::Idle);
    assert!(
        spool_is_empty(&spool)?,
        "Failed chunks must be deleted, not retried"
    );

    Ok(())
}

#[tokio::test]
async fn test_start_is_idempotent_and_session_is_stable() -> Result<()> {
    let service = Service::new();
    let base = spawn_service(service.clone()).await?;
    let spool = TempDir::new()?;

    let probe = Probe::default();
    let controller = controller_with(&base, Box::new(ProbeBackend::new(probe.clone())), &spool, 50)?;

    controller.start().await;
    controller.start().await;
    assert_eq!(controller.state(), LoopState::Running);

    assert!(wait_for_requests(&service, 3, Duration::from_secs(5)).await);

    // Two start() calls did not produce two loop bodies
    assert_eq!(probe.max_active(), 1);

    // Every upload carried the same session identity
    let session = controller.session_id().to_string();
    let sessions = service.chunk_sessions();
    assert!(sessions.len() >= 3);
    assert!(sessions.iter().all(|s| *s == session));

    controller.stop().await;
    assert_eq!(controller.state(), LoopState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_stop_during_capture_is_bounded_and_releases_device() -> Result<()> {
    let service = Service::new();
    let base = spawn_service(service.clone()).await?;
    let spool = TempDir::new()?;

    let probe = Probe::default();
    // Five-second chunks: stop() lands mid-recording
    let controller =
        controller_with(&base, Box::new(ProbeBackend::new(probe.clone())), &spool, 5000)?;

    controller.start().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(probe.active(), 1, "Capture should be in flight");

    let started = Instant::now();
    controller.stop().await;
    let elapsed = started.elapsed();

    assert_eq!(controller.state(), LoopState::Idle);
    assert!(
        elapsed < Duration::from_secs(2),
        "Stop should not wait out the full chunk, took {:?}",
        elapsed
    );
    assert_eq!(probe.active(), 0, "Microphone must be released");
    assert_eq!(
        service.chunk_requests(),
        0,
        "The torn chunk must not be uploaded"
    );
    assert!(spool_is_empty(&spool)?, "The partial artifact must be gone");

    // No further chunks are captured after stop
    let starts = probe.starts.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(probe.starts.load(Ordering::SeqCst), starts);

    Ok(())
}

#[tokio::test]
async fn test_flush_appends_caption_without_touching_loop_state() -> Result<()> {
    let service = Service::new();
    service.flush_body(r#"{"transcript":"ok"}"#);
    let base = spawn_service(service.clone()).await?;
    let spool = TempDir::new()?;

    let probe = Probe::default();
    let controller = controller_with(&base, Box::new(ProbeBackend::new(probe.clone())), &spool, 50)?;

    controller.start().await;
    assert!(wait_for_requests(&service, 1, Duration::from_secs(5)).await);

    controller.flush().await;

    assert_eq!(
        controller.state(),
        LoopState::Running,
        "Flush must not alter loop state"
    );

    let captions = controller.captions().snapshot().await;
    assert!(
        captions.iter().any(|c| c.text == "ok"),
        "Flush transcript should be appended"
    );

    // Flush carried the same session identity as the uploads
    assert_eq!(
        service.flush_sessions(),
        vec![controller.session_id().to_string()]
    );

    controller.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_flush_works_while_idle() -> Result<()> {
    let service = Service::new();
    service.flush_body(r#"{"transcript":"tail"}"#);
    let base = spawn_service(service.clone()).await?;
    let spool = TempDir::new()?;

    let probe = Probe::default();
    let controller = controller_with(&base, Box::new(ProbeBackend::new(probe.clone())), &spool, 50)?;

    assert_eq!(controller.state(), LoopState::Idle);
    controller.flush().await;

    assert_eq!(controller.state(), LoopState::Idle);
    let captions = controller.captions().snapshot().await;
    assert_eq!(captions.len(), 1);
    assert_eq!(captions[0].text, "tail");

    Ok(())
}

#[tokio::test]
async fn test_loop_can_restart_with_same_session() -> Result<()> {
    let service = Service::new();
    let base = spawn_service(service.clone()).await?;
    let spool = TempDir::new()?;

    let probe = Probe::default();
    let controller = controller_with(&base, Box::new(ProbeBackend::new(probe.clone())), &spool, 50)?;

    controller.start().await;
    assert!(wait_for_requests(&service, 1, Duration::from_secs(5)).await);
    controller.stop().await;
    assert_eq!(controller.state(), LoopState::Idle);

    let before_restart = service.chunk_requests();
    controller.start().await;
    assert_eq!(controller.state(), LoopState::Running);
    assert!(wait_for_requests(&service, before_restart + 1, Duration::from_secs(5)).await);

    controller.stop().await;

    // Session identity survives stop/start cycles of the same controller
    let session = controller.session_id().to_string();
    assert!(service.chunk_sessions().iter().all(|s| *s == session));

    Ok(())
}
