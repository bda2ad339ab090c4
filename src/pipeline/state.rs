//! Score state published by the predict stage
//!
//! The score and its completion time travel together through a watch
//! channel, so a reader always sees a pair written by the same update.
//! There is exactly one [`ScoreWriter`]; readers are cheap to clone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Last published model score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub score: f64,
    pub last_dt: Option<DateTime<Utc>>,
}

/// Create the single writer and a reader for a fresh score state
pub fn score_channel() -> (ScoreWriter, ScoreReader) {
    let (tx, rx) = watch::channel(ScoreSnapshot::default());
    (ScoreWriter { tx }, ScoreReader { rx })
}

/// Write side, owned by the predict stage. Not `Clone`.
#[derive(Debug)]
pub struct ScoreWriter {
    tx: watch::Sender<ScoreSnapshot>,
}

impl ScoreWriter {
    /// Replace score and timestamp in one step
    pub fn publish(&self, score: f64, completed_at: DateTime<Utc>) {
        self.tx.send_replace(ScoreSnapshot {
            score,
            last_dt: Some(completed_at),
        });
    }
}

/// Read side, shared by API handlers and tests
#[derive(Debug, Clone)]
pub struct ScoreReader {
    rx: watch::Receiver<ScoreSnapshot>,
}

impl ScoreReader {
    /// Current value; keeps working after the writer is gone
    pub fn snapshot(&self) -> ScoreSnapshot {
        *self.rx.borrow()
    }

    /// Wait for the next publish. Returns `None` once the writer is dropped
    /// without publishing again.
    pub async fn changed(&mut self) -> Option<ScoreSnapshot> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot_is_default() {
        let (_writer, reader) = score_channel();
        let snapshot = reader.snapshot();
        assert_eq!(snapshot.score, 0.0);
        assert!(snapshot.last_dt.is_none());
    }

    #[test]
    fn test_publish_updates_pair() {
        let (writer, reader) = score_channel();
        let now = Utc::now();
        writer.publish(0.87, now);

        assert_eq!(
            reader.snapshot(),
            ScoreSnapshot {
                score: 0.87,
                last_dt: Some(now)
            }
        );
    }

    #[test]
    fn test_snapshot_survives_writer_drop() {
        let (writer, reader) = score_channel();
        writer.publish(0.5, Utc::now());
        drop(writer);
        assert_eq!(reader.snapshot().score, 0.5);
    }

    #[tokio::test]
    async fn test_changed_wakes_on_publish() {
        let (writer, mut reader) = score_channel();
        let handle = tokio::spawn(async move { reader.changed().await });

        writer.publish(0.9, Utc::now());
        let seen = handle.await.unwrap().unwrap();
        assert_eq!(seen.score, 0.9);
    }

    #[tokio::test]
    async fn test_changed_returns_none_when_writer_dropped() {
        let (writer, mut reader) = score_channel();
        drop(writer);
        assert!(reader.changed().await.is_none());
    }

    #[test]
    fn test_snapshot_serializes_null_timestamp() {
        let json = serde_json::to_value(ScoreSnapshot::default()).unwrap();
        assert_eq!(json, serde_json::json!({"score": 0.0, "last_dt": null}));
    }
}
