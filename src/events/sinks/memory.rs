//! Bounded in-memory event sink.
//!
//! A ring buffer (oldest evicted first) for querying recent events by type,
//! workflow, or stage. Intended for tests and short-lived debugging.

use crate::events::emitter::{EventSink, SinkError};
use crate::events::types::{EventType, WorkflowEvent};
use crate::stages::StageId;
use parking_lot::RwLock;
use std::collections::VecDeque;
use uuid::Uuid;

pub struct MemorySink {
    buffer: RwLock<VecDeque<WorkflowEvent>>,
    capacity: usize,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }

    /// Most recent `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<WorkflowEvent> {
        let buffer = self.buffer.read();
        buffer.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn events_of_type(&self, event_type: EventType) -> Vec<WorkflowEvent> {
        self.buffer
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn events_for_workflow(&self, workflow_id: Uuid) -> Vec<WorkflowEvent> {
        self.buffer
            .read()
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect()
    }

    pub fn events_for_stage(&self, stage: StageId) -> Vec<WorkflowEvent> {
        self.buffer
            .read()
            .iter()
            .filter(|e| e.stage == Some(stage))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.buffer.write().clear();
    }
}

#[async_trait::async_trait]
impl EventSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deliver(&self, event: &WorkflowEvent) -> Result<(), SinkError> {
        let mut buffer = self.buffer.write();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: EventType, workflow_id: Uuid) -> WorkflowEvent {
        WorkflowEvent::new(event_type, workflow_id, serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_oldest_evicted_first() {
        let sink = MemorySink::new(2);
        let id = Uuid::new_v4();
        sink.deliver(&event(EventType::WorkflowStarted, id)).await.unwrap();
        sink.deliver(&event(EventType::StageStarted, id)).await.unwrap();
        sink.deliver(&event(EventType::WorkflowCompleted, id)).await.unwrap();

        assert_eq!(sink.len(), 2);
        let recent = sink.recent(2);
        assert_eq!(recent[0].event_type, EventType::StageStarted);
        assert_eq!(recent[1].event_type, EventType::WorkflowCompleted);
    }

    #[tokio::test]
    async fn test_query_by_workflow_and_type() {
        let sink = MemorySink::new(8);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        sink.deliver(&event(EventType::WorkflowStarted, first)).await.unwrap();
        sink.deliver(&event(EventType::WorkflowStarted, second)).await.unwrap();
        sink.deliver(&event(EventType::WorkflowFailed, second)).await.unwrap();

        assert_eq!(sink.events_for_workflow(first).len(), 1);
        assert_eq!(sink.events_of_type(EventType::WorkflowStarted).len(), 2);
        assert_eq!(sink.events_of_type(EventType::WorkflowFailed).len(), 1);
    }
}
