//! Single-line human-readable console sink.

use crate::constants::system;
use crate::events::emitter::{EventSink, SinkError};
use crate::events::types::WorkflowEvent;

pub struct ConsoleSink {
    /// Maximum payload characters rendered per line
    truncate_at: usize,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            truncate_at: system::EVENT_OUTPUT_TRUNCATION,
        }
    }

    pub fn with_truncation(truncate_at: usize) -> Self {
        Self { truncate_at }
    }

    fn render(&self, event: &WorkflowEvent) -> String {
        let stage = event
            .stage
            .map(|s| format!(" stage={s}"))
            .unwrap_or_default();
        let timing = event
            .execution_time_ms
            .map(|ms| format!(" {ms}ms"))
            .unwrap_or_default();
        let error = event
            .error
            .as_deref()
            .map(|e| format!(" error={e}"))
            .unwrap_or_default();

        let mut payload = event.data.to_string();
        if payload.chars().count() > self.truncate_at {
            payload = payload.chars().take(self.truncate_at).collect();
            payload.push('…');
        }

        format!(
            "[{}] {} workflow={}{stage}{timing}{error} {payload}",
            event.timestamp.format("%H:%M:%S%.3f"),
            event.event_type.name(),
            event.workflow_id,
        )
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EventSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, event: &WorkflowEvent) -> Result<(), SinkError> {
        println!("{}", self.render(event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::stages::StageId;
    use uuid::Uuid;

    #[test]
    fn test_render_is_single_line_and_truncated() {
        let sink = ConsoleSink::with_truncation(20);
        let event = WorkflowEvent::new(
            EventType::StageCompleted,
            Uuid::new_v4(),
            serde_json::json!({"answer": "a".repeat(100)}),
        )
        .with_stage(StageId::Synthesizer)
        .with_execution_time(42);

        let line = sink.render(&event);
        assert!(!line.contains('\n'));
        assert!(line.contains("stage.completed"));
        assert!(line.contains("stage=synthesizer"));
        assert!(line.contains("42ms"));
        assert!(line.contains('…'));
    }
}
