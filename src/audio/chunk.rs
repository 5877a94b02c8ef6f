use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, CaptureBackend};
use super::error::CaptureError;

/// Handle to one transiently stored chunk recording.
///
/// The file is deleted exactly once: either through the consuming `remove()`
/// after the upload attempt, or by the drop guard if the handle is abandoned.
#[derive(Debug)]
pub struct ChunkArtifact {
    path: PathBuf,
    deleted: bool,
    /// Number of samples written to the file
    pub sample_count: usize,
    /// Audible length of the chunk in milliseconds
    pub duration_ms: u64,
}

impl ChunkArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name to present to the upload endpoint
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chunk.wav".to_string())
    }

    /// Delete the backing file. Consumes the handle.
    pub fn remove(mut self) {
        self.deleted = true;
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to delete chunk artifact {}: {}", self.path.display(), e);
        }
    }
}

impl Drop for ChunkArtifact {
    fn drop(&mut self) {
        if self.deleted {
            return;
        }
        self.deleted = true;
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(
                "Failed to delete abandoned chunk artifact {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Records one fixed-duration chunk per call
///
/// Acquires the capture backend, collects frames for the chunk duration, and
/// writes them to a WAV artifact in the spool directory. The backend is
/// released on every exit path; a cancelled capture deletes its partial file
/// and yields `Ok(None)`.
pub struct ChunkRecorder {
    spool_dir: PathBuf,
    session_id: String,
    target_sample_rate: u32,
    target_channels: u16,
    chunk_index: u64,
}

impl ChunkRecorder {
    pub fn new(
        spool_dir: PathBuf,
        session_id: String,
        target_sample_rate: u32,
        target_channels: u16,
    ) -> Result<Self, CaptureError> {
        fs::create_dir_all(&spool_dir)?;

        info!(
            "Chunk recorder initialized: {} ({}Hz, {} channel(s))",
            session_id, target_sample_rate, target_channels
        );

        Ok(Self {
            spool_dir,
            session_id,
            target_sample_rate,
            target_channels,
            chunk_index: 0,
        })
    }

    /// Record one chunk of `duration` from the backend.
    ///
    /// Returns `Ok(None)` if the cancellation token fired while recording; the
    /// microphone is released and the partial file is gone either way.
    pub async fn capture_chunk(
        &mut self,
        backend: &mut dyn CaptureBackend,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<ChunkArtifact>, CaptureError> {
        let mut rx = backend.start().await?;

        let path = self.spool_dir.join(format!(
            "{}-chunk-{:05}.wav",
            self.session_id, self.chunk_index
        ));

        let outcome = self.record_frames(&mut rx, &path, duration, cancel).await;

        // Drop the receiver first so a backend blocked on a full channel can
        // observe the stop request.
        drop(rx);
        if let Err(e) = backend.stop().await {
            warn!("Failed to release capture backend: {}", e);
        }

        match outcome {
            Ok(Some(artifact)) => {
                debug!(
                    "Chunk {} complete: {}ms, {} samples",
                    self.chunk_index, artifact.duration_ms, artifact.sample_count
                );
                self.chunk_index += 1;
                Ok(Some(artifact))
            }
            other => other,
        }
    }

    async fn record_frames(
        &self,
        rx: &mut mpsc::Receiver<AudioFrame>,
        path: &Path,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<ChunkArtifact>, CaptureError> {
        let mut writer = ChunkWriter::new(
            path.to_path_buf(),
            self.target_sample_rate,
            self.target_channels,
        )?;

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Capture cancelled, discarding partial chunk");
                    return Ok(None);
                }
                _ = &mut deadline => break,
                frame = rx.recv() => match frame {
                    Some(frame) => {
                        let frame = process_frame(
                            frame,
                            self.target_sample_rate,
                            self.target_channels,
                        );
                        writer.write_frame(&frame)?;
                    }
                    None => return Err(CaptureError::StreamClosed),
                }
            }
        }

        let artifact = writer.finish()?;
        Ok(Some(artifact))
    }
}

/// Writes a single chunk to disk as a WAV file
struct ChunkWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
    sample_count: usize,
    keep: bool,
}

impl ChunkWriter {
    fn new(path: PathBuf, sample_rate: u32, channels: u16) -> Result<Self, CaptureError> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)?;

        Ok(Self {
            writer: Some(writer),
            path,
            sample_rate,
            channels,
            sample_count: 0,
            keep: false,
        })
    }

    fn write_frame(&mut self, frame: &AudioFrame) -> Result<(), CaptureError> {
        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer.write_sample(sample)?;
            }
            self.sample_count += frame.samples.len();
        }

        Ok(())
    }

    fn finish(mut self) -> Result<ChunkArtifact, CaptureError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }

        self.keep = true;

        let duration_ms = self.sample_count as u64 * 1000
            / (self.sample_rate as u64 * self.channels as u64);

        Ok(ChunkArtifact {
            path: self.path.clone(),
            deleted: false,
            sample_count: self.sample_count,
            duration_ms,
        })
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        // Abandoned chunk (cancellation or error): close and delete the file
        if self.keep {
            return;
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.finalize();
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(
                "Failed to delete partial chunk {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Convert a frame to the target format before writing
fn process_frame(frame: AudioFrame, target_sample_rate: u32, target_channels: u16) -> AudioFrame {
    let mut processed = frame;

    if processed.sample_rate != target_sample_rate {
        processed = downsample_frame(processed, target_sample_rate);
    }

    if processed.channels != target_channels && target_channels == 1 {
        processed = stereo_to_mono(processed);
    }

    processed
}

/// Downsample an audio frame by decimation
fn downsample_frame(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate {
        return frame;
    }

    let ratio = frame.sample_rate / target_rate;
    if ratio <= 1 {
        return frame; // Can't upsample
    }

    // Decimate: take every Nth sample
    let downsampled: Vec<i16> = frame
        .samples
        .iter()
        .step_by(ratio as usize)
        .copied()
        .collect();

    AudioFrame {
        samples: downsampled,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Convert stereo to mono by summing channels
fn stereo_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels == 1 {
        return frame;
    }

    if frame.channels != 2 {
        return frame; // Only support stereo -> mono
    }

    let mut mono_samples = Vec::with_capacity(frame.samples.len() / 2);

    // Sum left and right channels (no division to preserve volume)
    for chunk in frame.samples.chunks_exact(2) {
        let left = chunk[0] as i32;
        let right = chunk[1] as i32;
        let sum = left + right;
        let mono = sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        mono_samples.push(mono);
    }

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}
