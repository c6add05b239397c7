//! Split progress events and per-source status tracking

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result of a completed on-disk split
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SplitOutcome {
    pub success: bool,
    pub total_files: usize,
    pub pages_per_file: u32,
    /// Chunk file names, in order
    pub files: Vec<String>,
    pub download_url: String,
    pub file_id: String,
}

/// One progress event, serialized as `{"type": ..., "data": {...}}`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SplitEvent {
    TotalFiles {
        total: usize,
    },
    FileStart {
        current: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    FileStep {
        file_index: usize,
        step: String,
        percentage: u8,
    },
    FileComplete {
        completed: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    FileError {
        file_index: usize,
        message: String,
    },
    AllComplete {
        completed: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    ZipProgress {
        current: usize,
        total: usize,
        percentage: u8,
        file_name: String,
    },
    Complete(SplitOutcome),
    Error {
        message: String,
    },
}

/// Where progress events go; a no-op sink drops them
///
/// Clones share one sender, so `close` ends the stream for all of them.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<SplitEvent>>>>,
}

impl ProgressSink {
    pub fn none() -> Self {
        Self::default()
    }

    /// Sink plus the receiving end for a streaming response
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SplitEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Send an event; a disconnected or closed sink is ignored
    pub fn emit(&self, event: SplitEvent) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Drop the sender; the receiver sees the end of the stream
    pub fn close(&self) {
        self.tx.lock().take();
    }
}

/// Lifecycle of a split for one source file
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SplitPhase {
    #[default]
    Idle,
    Unpacking,
    Splitting,
    Zipping,
    Complete,
    Failed,
}

/// Latest known state of a split
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SplitStatus {
    pub phase: SplitPhase,
    /// Chunk (splitting) or archive entry (zipping) being worked on
    pub current: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for SplitStatus {
    fn default() -> Self {
        Self {
            phase: SplitPhase::Idle,
            current: 0,
            total: 0,
            message: None,
            updated_at: None,
        }
    }
}

/// Status table shared between the splitter and the status route
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    entries: Arc<DashMap<String, SplitStatus>>,
}

impl StatusTracker {
    pub fn get(&self, id: &str) -> SplitStatus {
        self.entries
            .get(id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Handle that updates one source id
    pub fn handle(&self, id: &str) -> StatusHandle {
        StatusHandle {
            entries: Arc::clone(&self.entries),
            id: id.to_string(),
        }
    }
}

/// Writer for one id's status; cheap to clone into blocking tasks
#[derive(Debug, Clone)]
pub struct StatusHandle {
    entries: Arc<DashMap<String, SplitStatus>>,
    id: String,
}

impl StatusHandle {
    /// Start a new run, replacing whatever the last run left
    pub fn begin(&self) {
        self.entries.insert(
            self.id.clone(),
            SplitStatus {
                phase: SplitPhase::Unpacking,
                updated_at: Some(Utc::now()),
                ..SplitStatus::default()
            },
        );
    }

    /// Progress update; a failed run stays failed
    pub fn set(&self, phase: SplitPhase, current: usize, total: usize) {
        let mut entry = self.entries.entry(self.id.clone()).or_default();
        if entry.phase == SplitPhase::Failed {
            return;
        }
        *entry = SplitStatus {
            phase,
            current,
            total,
            message: None,
            updated_at: Some(Utc::now()),
        };
    }

    pub fn fail(&self, message: impl Into<String>) {
        let mut entry = self.entries.entry(self.id.clone()).or_default();
        entry.phase = SplitPhase::Failed;
        entry.message = Some(message.into());
        entry.updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = SplitEvent::FileStep {
            file_index: 2,
            step: "write".into(),
            percentage: 50,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "file_step", "data": {"fileIndex": 2, "step": "write", "percentage": 50}})
        );

        let event = SplitEvent::AllComplete { completed: 3, total: 3 };
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "all_complete");
    }

    #[test]
    fn test_status_tracking() {
        let tracker = StatusTracker::default();
        assert_eq!(tracker.get("a").phase, SplitPhase::Idle);

        let handle = tracker.handle("a");
        handle.set(SplitPhase::Splitting, 2, 5);
        handle.fail("corrupt");

        let status = tracker.get("a");
        assert_eq!(status.phase, SplitPhase::Failed);
        assert_eq!(status.current, 2);
        assert_eq!(status.message.as_deref(), Some("corrupt"));
        assert_eq!(tracker.get("b").phase, SplitPhase::Idle);
    }

    #[tokio::test]
    async fn test_sink_delivers_until_dropped() {
        let (sink, mut rx) = ProgressSink::channel();
        sink.emit(SplitEvent::TotalFiles { total: 1 });
        assert_eq!(rx.recv().await, Some(SplitEvent::TotalFiles { total: 1 }));

        drop(rx);
        sink.emit(SplitEvent::TotalFiles { total: 2 });
        ProgressSink::none().emit(SplitEvent::TotalFiles { total: 3 });
    }

    #[tokio::test]
    async fn test_close_ends_stream_for_clones() {
        let (sink, mut rx) = ProgressSink::channel();
        let held = sink.clone();
        sink.emit(SplitEvent::Error { message: "late".into() });
        sink.close();
        held.emit(SplitEvent::TotalFiles { total: 9 });

        assert_eq!(rx.recv().await, Some(SplitEvent::Error { message: "late".into() }));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_failed_is_final_until_next_run() {
        let tracker = StatusTracker::default();
        let handle = tracker.handle("a");
        handle.begin();
        handle.fail("timed out");
        handle.set(SplitPhase::Zipping, 1, 1);
        handle.set(SplitPhase::Complete, 1, 1);
        assert_eq!(tracker.get("a").phase, SplitPhase::Failed);

        handle.begin();
        assert_eq!(tracker.get("a").phase, SplitPhase::Unpacking);
        assert_eq!(tracker.get("a").message, None);
        handle.set(SplitPhase::Splitting, 1, 2);
        assert_eq!(tracker.get("a").phase, SplitPhase::Splitting);
    }
}
