use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub transcribe: TranscribeConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    /// Directory for transient chunk artifacts
    pub spool_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Length of each recorded chunk in milliseconds
    pub chunk_duration_ms: u64,
    /// Pause after a capture failure before the next attempt
    pub capture_retry_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct TranscribeConfig {
    /// Chunk upload endpoint
    pub chunk_url: String,
    /// Session flush endpoint
    pub flush_url: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let default_spool = std::env::temp_dir().join("caption-relay");

        let settings = config::Config::builder()
            .set_default("service.name", "caption-relay")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 8787)?
            .set_default("capture.spool_path", default_spool.to_string_lossy().to_string())?
            .set_default("capture.sample_rate", 16000)?
            .set_default("capture.channels", 1)?
            .set_default("capture.chunk_duration_ms", 1400)?
            .set_default("capture.capture_retry_delay_ms", 300)?
            .set_default("transcribe.chunk_url", "http://127.0.0.1:8000/api/chunk")?
            .set_default("transcribe.flush_url", "http://127.0.0.1:8000/api/flush")?
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
