//! Append-only NDJSON file sink with size-based rotation and rolling stats.

use crate::events::emitter::{EventSink, SinkError};
use crate::events::types::WorkflowEvent;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

/// Rolling aggregate over everything this sink has written.
#[derive(Debug, Clone, Default)]
pub struct FileSinkStats {
    pub total_events: u64,
    pub counts_by_type: HashMap<String, u64>,
    pub counts_by_stage: HashMap<String, u64>,
    pub error_events: u64,
    /// Running average over events that carried an execution time
    pub average_execution_time_ms: f64,
    pub timed_events: u64,
    pub rotations: u64,
}

impl FileSinkStats {
    pub fn error_rate(&self) -> f64 {
        if self.total_events == 0 {
            0.0
        } else {
            self.error_events as f64 / self.total_events as f64
        }
    }

    fn record(&mut self, event: &WorkflowEvent) {
        self.total_events += 1;
        *self
            .counts_by_type
            .entry(event.event_type.name().to_string())
            .or_insert(0) += 1;
        if let Some(stage) = event.stage {
            *self
                .counts_by_stage
                .entry(stage.as_str().to_string())
                .or_insert(0) += 1;
        }
        if event.error.is_some() {
            self.error_events += 1;
        }
        if let Some(ms) = event.execution_time_ms {
            // Incremental running mean
            self.timed_events += 1;
            self.average_execution_time_ms +=
                (ms as f64 - self.average_execution_time_ms) / self.timed_events as f64;
        }
    }
}

struct FileSinkInner {
    file: File,
    bytes_written: u64,
    stats: FileSinkStats,
}

/// Newline-delimited JSON event log with rename-and-continue rotation.
pub struct FileSink {
    path: PathBuf,
    max_bytes: u64,
    inner: Mutex<FileSinkInner>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let bytes_written = file.metadata()?.len();

        Ok(Self {
            path,
            max_bytes,
            inner: Mutex::new(FileSinkInner {
                file: File::from_std(file),
                bytes_written,
                stats: FileSinkStats::default(),
            }),
        })
    }

    pub async fn stats(&self) -> FileSinkStats {
        self.inner.lock().await.stats.clone()
    }

    async fn rotate(&self, inner: &mut FileSinkInner) -> Result<(), SinkError> {
        inner.file.flush().await?;
        let rotated = self
            .path
            .with_extension(format!("{}.ndjson", Utc::now().format("%Y%m%d%H%M%S%.3f")));
        tokio::fs::rename(&self.path, &rotated).await?;
        inner.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        inner.bytes_written = 0;
        inner.stats.rotations += 1;

        info!(
            path = %self.path.display(),
            rotated_to = %rotated.display(),
            "📁 Event log rotated"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn deliver(&self, event: &WorkflowEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut inner = self.inner.lock().await;
        if inner.bytes_written + line.len() as u64 > self.max_bytes && inner.bytes_written > 0 {
            self.rotate(&mut inner).await?;
        }
        inner.file.write_all(line.as_bytes()).await?;
        inner.file.flush().await?;
        inner.bytes_written += line.len() as u64;
        inner.stats.record(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::stages::StageId;
    use uuid::Uuid;

    fn event(event_type: EventType) -> WorkflowEvent {
        WorkflowEvent::new(event_type, Uuid::new_v4(), serde_json::json!({"k": "v"}))
    }

    #[tokio::test]
    async fn test_writes_newline_delimited_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.ndjson");
        let sink = FileSink::new(&path, 1024 * 1024).unwrap();

        sink.deliver(&event(EventType::WorkflowStarted)).await.unwrap();
        sink.deliver(&event(EventType::WorkflowCompleted)).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(parsed["event_type"].is_string());
        }
    }

    #[tokio::test]
    async fn test_rotation_renames_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.ndjson");
        // Tiny threshold so the second event forces a rotation
        let sink = FileSink::new(&path, 64).unwrap();

        sink.deliver(&event(EventType::WorkflowStarted)).await.unwrap();
        sink.deliver(&event(EventType::WorkflowCompleted)).await.unwrap();

        let stats = sink.stats().await;
        assert_eq!(stats.rotations, 1);
        assert_eq!(stats.total_events, 2);

        // The active path still exists and holds the post-rotation event
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        // And a rotated file exists alongside it
        let rotated = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(rotated, 2);
    }

    #[tokio::test]
    async fn test_rolling_stats() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("events.ndjson"), 1024 * 1024).unwrap();

        sink.deliver(
            &event(EventType::StageCompleted)
                .with_stage(StageId::Refiner)
                .with_execution_time(100),
        )
        .await
        .unwrap();
        sink.deliver(
            &event(EventType::StageFailed)
                .with_stage(StageId::Critic)
                .with_execution_time(300)
                .with_error("boom"),
        )
        .await
        .unwrap();

        let stats = sink.stats().await;
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.counts_by_type["stage.completed"], 1);
        assert_eq!(stats.counts_by_stage["critic"], 1);
        assert!((stats.average_execution_time_ms - 200.0).abs() < f64::EPSILON);
        assert!((stats.error_rate() - 0.5).abs() < f64::EPSILON);
    }
}
