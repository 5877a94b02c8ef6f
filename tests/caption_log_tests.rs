// Tests for the append-only caption log
//
// The log is shared between the capture loop and flush; appends may race and
// must still assign unique, ordered sequence numbers.

use anyhow::Result;
use caption_relay::CaptionLog;
use std::sync::Arc;

#[tokio::test]
async fn test_append_assigns_sequence_in_order() -> Result<()> {
    let log = CaptionLog::new();

    assert_eq!(log.append_final("first").await, 0);
    assert_eq!(log.append_final("second").await, 1);
    assert_eq!(log.append_final("third").await, 2);

    let snapshot = log.snapshot().await;
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot[0].text, "first");
    assert_eq!(snapshot[1].text, "second");
    assert_eq!(snapshot[2].text, "third");

    Ok(())
}

#[tokio::test]
async fn test_empty_log() -> Result<()> {
    let log = CaptionLog::new();

    assert!(log.is_empty().await);
    assert_eq!(log.len().await, 0);
    assert!(log.snapshot().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_appends_do_not_corrupt_sequences() -> Result<()> {
    let log = Arc::new(CaptionLog::new());

    // Two writers racing, like the main loop and a flush
    let mut handles = Vec::new();
    for writer in 0..2 {
        let log = Arc::clone(&log);
        handles.push(tokio::spawn(async move {
            for i in 0..50 {
                log.append_final(format!("writer-{} entry-{}", writer, i)).await;
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }

    let snapshot = log.snapshot().await;
    assert_eq!(snapshot.len(), 100);

    // Sequences are exactly 0..100, in snapshot order
    for (i, entry) in snapshot.iter().enumerate() {
        assert_eq!(entry.sequence, i as u64);
    }

    // Per-writer relative order is preserved
    for writer in 0..2 {
        let texts: Vec<&str> = snapshot
            .iter()
            .filter(|e| e.text.starts_with(&format!("writer-{} ", writer)))
            .map(|e| e.text.as_str())
            .collect();
        let expected: Vec<String> = (0..50)
            .map(|i| format!("writer-{} entry-{}", writer, i))
            .collect();
        assert_eq!(texts, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    Ok(())
}
