use std::time::Duration;

use anyhow::{Context, Result};
use caption_relay::audio::{CaptureBackendConfig, CaptureBackendFactory, CaptureSource};
use caption_relay::{AppState, Config, LoopConfig, LoopController, TranscribeClient};
use clap::{Parser, ValueEnum};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    /// Default input device via cpal
    Mic,
    /// Generated tone (no device needed)
    Synthetic,
}

#[derive(Debug, Parser)]
#[command(name = "caption-relay", about = "Real-time speech capture client")]
struct Cli {
    /// Configuration file stem (e.g. config/caption-relay)
    #[arg(long, default_value = "config/caption-relay")]
    config: String,

    /// Capture source
    #[arg(long, value_enum, default_value = "mic")]
    source: SourceArg,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("caption-relay v0.1.0");
    info!("Loaded config: {}", cfg.service.name);

    let source = match cli.source {
        SourceArg::Mic => CaptureSource::Microphone,
        SourceArg::Synthetic => CaptureSource::Synthetic,
    };

    let backend = CaptureBackendFactory::create(
        source,
        CaptureBackendConfig {
            target_sample_rate: cfg.capture.sample_rate,
            target_channels: cfg.capture.channels,
            buffer_duration_ms: 100,
        },
    );

    let client = TranscribeClient::new(
        cfg.transcribe.chunk_url.clone(),
        cfg.transcribe.flush_url.clone(),
    );

    let loop_config = LoopConfig {
        chunk_duration: Duration::from_millis(cfg.capture.chunk_duration_ms),
        capture_retry_delay: Duration::from_millis(cfg.capture.capture_retry_delay_ms),
        spool_dir: cfg.capture.spool_path.clone().into(),
        sample_rate: cfg.capture.sample_rate,
        channels: cfg.capture.channels,
    };

    let controller = LoopController::new(backend, client, loop_config)
        .context("Failed to create loop controller")?;

    let router = caption_relay::create_router(AppState::new(controller));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP control surface listening on {}", addr);
    axum::serve(listener, router)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
