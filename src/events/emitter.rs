//! Async fan-out event emitter.
//!
//! Each `emit` call delivers the event to every registered sink concurrently
//! through an explicit join. Per-sink isolation is the load-bearing contract:
//! a failing sink is logged and skipped, never rethrown to the caller, so
//! observability can never crash the request path.

use crate::events::types::WorkflowEvent;
use crate::events::{EventCategory, EventType};
use crate::stages::StageId;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Error produced by a sink delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Sink error: {0}")]
    Other(String),
}

/// A pluggable destination for workflow events.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &WorkflowEvent) -> Result<(), SinkError>;
}

/// Per-sink event filter. An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub categories: Option<HashSet<EventCategory>>,
    pub event_types: Option<HashSet<EventType>>,
    pub stages: Option<HashSet<StageId>>,
}

impl EventFilter {
    pub fn matches(&self, event: &WorkflowEvent) -> bool {
        if let Some(categories) = &self.categories {
            if !categories.contains(&event.category) {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(stages) = &self.stages {
            match event.stage {
                Some(stage) if stages.contains(&stage) => {}
                _ => return false,
            }
        }
        true
    }

    pub fn for_categories(categories: impl IntoIterator<Item = EventCategory>) -> Self {
        Self {
            categories: Some(categories.into_iter().collect()),
            ..Default::default()
        }
    }
}

struct RegisteredSink {
    sink: Arc<dyn EventSink>,
    filter: EventFilter,
}

/// Fan-out emitter over a fixed set of sinks.
#[derive(Default)]
pub struct EventEmitter {
    sinks: Vec<RegisteredSink>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.register_sink_with_filter(sink, EventFilter::default());
    }

    pub fn register_sink_with_filter(&mut self, sink: Arc<dyn EventSink>, filter: EventFilter) {
        self.sinks.push(RegisteredSink { sink, filter });
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Fan the event out to every matching sink concurrently. Never fails:
    /// sink errors are logged and isolated.
    pub async fn emit(&self, event: WorkflowEvent) {
        let deliveries = self
            .sinks
            .iter()
            .filter(|registered| registered.filter.matches(&event))
            .map(|registered| {
                let sink = registered.sink.clone();
                let event = &event;
                async move {
                    if let Err(e) = sink.deliver(event).await {
                        warn!(
                            sink = sink.name(),
                            event_type = event.event_type.name(),
                            error = %e,
                            "Event sink delivery failed - isolating sink failure"
                        );
                    }
                }
            });

        join_all(deliveries).await;

        debug!(
            event_type = event.event_type.name(),
            workflow_id = %event.workflow_id,
            "Event fan-out complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct FailingSink {
        attempts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EventSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn deliver(&self, _event: &WorkflowEvent) -> Result<(), SinkError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::Other("sink is broken".to_string()))
        }
    }

    fn event(event_type: EventType) -> WorkflowEvent {
        WorkflowEvent::new(event_type, Uuid::new_v4(), serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_other_sinks() {
        let memory = Arc::new(MemorySink::new(16));
        let failing = Arc::new(FailingSink {
            attempts: AtomicUsize::new(0),
        });

        let mut emitter = EventEmitter::new();
        emitter.register_sink(failing.clone());
        emitter.register_sink(memory.clone());

        emitter.emit(event(EventType::WorkflowStarted)).await;

        assert_eq!(failing.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_by_category() {
        let memory = Arc::new(MemorySink::new(16));
        let mut emitter = EventEmitter::new();
        emitter.register_sink_with_filter(
            memory.clone(),
            EventFilter::for_categories([EventCategory::Orchestration]),
        );

        emitter.emit(event(EventType::StageStarted)).await;
        emitter.emit(event(EventType::WorkflowCompleted)).await;

        let delivered = memory.recent(16);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].event_type, EventType::WorkflowCompleted);
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = EventFilter::default();
        assert!(filter.matches(&event(EventType::CircuitOpened)));
    }

    #[test]
    fn test_stage_filter_requires_stage_metadata() {
        let filter = EventFilter {
            stages: Some([StageId::Critic].into_iter().collect()),
            ..Default::default()
        };
        // No stage metadata on the event: filtered out
        assert!(!filter.matches(&event(EventType::StageStarted)));
        let with_stage = event(EventType::StageStarted).with_stage(StageId::Critic);
        assert!(filter.matches(&with_stage));
    }
}
