use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::audio::ChunkArtifact;
use crate::session::SessionId;

/// Outcome of one upload or flush attempt.
///
/// `Failed` is terminal for the chunk: it is discarded, never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    /// The service buffered the audio; no transcript yet
    Interim,
    /// The service finalized a segment
    Final { transcript: String },
    /// Non-2xx status, transport error, or malformed reply
    Failed { reason: String },
}

/// An `UploadResult` plus the raw response body, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct UploadReply {
    pub result: UploadResult,
    pub body: String,
}

impl UploadReply {
    fn failed(reason: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            result: UploadResult::Failed {
                reason: reason.into(),
            },
            body: body.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    status: String,
    transcript: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlushResponse {
    transcript: Option<String>,
}

#[derive(serde::Serialize)]
struct FlushRequest<'a> {
    session_id: &'a str,
}

/// HTTP client for the transcription service.
///
/// Chunks go to the chunk endpoint as multipart (binary WAV + session id);
/// flush goes to the flush endpoint as JSON. All failures collapse into
/// `UploadResult::Failed` — nothing here can take the capture loop down.
pub struct TranscribeClient {
    http: reqwest::Client,
    chunk_url: String,
    flush_url: String,
}

impl TranscribeClient {
    pub fn new(chunk_url: String, flush_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            chunk_url,
            flush_url,
        }
    }

    /// Upload one chunk artifact for the given session.
    ///
    /// The artifact is deleted before this returns, on every branch.
    pub async fn upload_chunk(&self, artifact: ChunkArtifact, session_id: &SessionId) -> UploadReply {
        let reply = self.send_chunk(&artifact, session_id).await;
        artifact.remove();
        reply
    }

    async fn send_chunk(&self, artifact: &ChunkArtifact, session_id: &SessionId) -> UploadReply {
        let bytes = match tokio::fs::read(artifact.path()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return UploadReply::failed(format!("failed to read chunk: {}", e), String::new())
            }
        };

        debug!(
            bytes = bytes.len(),
            session = %session_id,
            "Uploading chunk to {}",
            self.chunk_url
        );

        let file_part = match multipart::Part::bytes(bytes)
            .file_name(artifact.file_name())
            .mime_str("audio/wav")
        {
            Ok(part) => part,
            Err(e) => return UploadReply::failed(e.to_string(), String::new()),
        };

        let form = multipart::Form::new()
            .text("session_id", session_id.to_string())
            .part("file", file_part);

        let resp = self
            .http
            .post(&self.chunk_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => return UploadReply::failed(e.to_string(), e.to_string()),
        };

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!("Chunk upload failed: {} {}", status, body);
            return UploadReply::failed(status.as_u16().to_string(), body);
        }

        match serde_json::from_str::<ChunkResponse>(&body) {
            Ok(parsed) => {
                let result = match (parsed.status.as_str(), parsed.transcript) {
                    ("final", Some(transcript)) => UploadResult::Final { transcript },
                    // "interim"/"buffered" and a "final" with no text all mean
                    // nothing to append yet
                    _ => UploadResult::Interim,
                };
                UploadReply { result, body }
            }
            Err(e) => {
                warn!("Malformed chunk response: {}", e);
                UploadReply::failed(format!("malformed response: {}", e), body)
            }
        }
    }

    /// Ask the service to finalize buffered audio for the session.
    pub async fn flush(&self, session_id: &SessionId) -> UploadReply {
        debug!(session = %session_id, "Flushing session at {}", self.flush_url);

        let resp = self
            .http
            .post(&self.flush_url)
            .json(&FlushRequest {
                session_id: session_id.as_str(),
            })
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => return UploadReply::failed(e.to_string(), e.to_string()),
        };

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!("Flush failed: {} {}", status, body);
            return UploadReply::failed(status.as_u16().to_string(), body);
        }

        match serde_json::from_str::<FlushResponse>(&body) {
            Ok(parsed) => {
                let result = match parsed.transcript {
                    Some(transcript) => UploadResult::Final { transcript },
                    None => UploadResult::Interim,
                };
                UploadReply { result, body }
            }
            Err(e) => {
                warn!("Malformed flush response: {}", e);
                UploadReply::failed(format!("malformed response: {}", e), body)
            }
        }
    }
}
