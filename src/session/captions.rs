use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

/// A single finalized caption
#[derive(Debug, Clone, Serialize)]
pub struct CaptionEntry {
    /// Position in the log (assignment order, not chunk recording order)
    pub sequence: u64,
    /// Transcribed text
    pub text: String,
    /// When this entry was appended
    pub at: DateTime<Utc>,
}

/// Ordered, append-only log of finalized transcripts
///
/// The capture loop and flush append concurrently; both go through the same
/// lock, so sequence numbers are assigned atomically and entries are never
/// reordered or removed.
#[derive(Debug, Default)]
pub struct CaptionLog {
    entries: Mutex<Vec<CaptionEntry>>,
}

impl CaptionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalized transcript; returns the assigned sequence number.
    pub async fn append_final(&self, text: impl Into<String>) -> u64 {
        let mut entries = self.entries.lock().await;
        let sequence = entries.len() as u64;
        entries.push(CaptionEntry {
            sequence,
            text: text.into(),
            at: Utc::now(),
        });
        sequence
    }

    /// Ordered read-only view for observers
    pub async fn snapshot(&self) -> Vec<CaptionEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
