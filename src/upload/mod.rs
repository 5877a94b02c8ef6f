//! HTTP client for the remote transcription service
//!
//! Two endpoints:
//! - chunk upload: multipart POST with the audio artifact and the session id
//! - flush: JSON POST asking the service to finalize buffered audio

pub mod client;

pub use client::{TranscribeClient, UploadReply, UploadResult};
