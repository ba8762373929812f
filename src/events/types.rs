//! Workflow event records.
//!
//! Events are constructed at the moment something notable happens, handed to
//! the emitter, and never mutated afterwards.

use crate::constants::events as event_names;
use crate::stages::StageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed enumeration of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    RoutingDecided,
    CheckpointSaved,
    GraphCompiled,
    GraphCacheHit,
    StageStarted,
    StageCompleted,
    StageFailed,
    StageSkipped,
    CircuitOpened,
}

impl EventType {
    /// Stable dotted event name shared across sinks.
    pub fn name(&self) -> &'static str {
        match self {
            EventType::WorkflowStarted => event_names::WORKFLOW_STARTED,
            EventType::WorkflowCompleted => event_names::WORKFLOW_COMPLETED,
            EventType::WorkflowFailed => event_names::WORKFLOW_FAILED,
            EventType::RoutingDecided => event_names::WORKFLOW_ROUTING_DECIDED,
            EventType::CheckpointSaved => event_names::WORKFLOW_CHECKPOINT_SAVED,
            EventType::GraphCompiled => event_names::GRAPH_COMPILED,
            EventType::GraphCacheHit => event_names::GRAPH_CACHE_HIT,
            EventType::StageStarted => event_names::STAGE_STARTED,
            EventType::StageCompleted => event_names::STAGE_COMPLETED,
            EventType::StageFailed => event_names::STAGE_FAILED,
            EventType::StageSkipped => event_names::STAGE_SKIPPED,
            EventType::CircuitOpened => event_names::STAGE_CIRCUIT_OPENED,
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            EventType::WorkflowStarted
            | EventType::WorkflowCompleted
            | EventType::WorkflowFailed
            | EventType::RoutingDecided
            | EventType::CheckpointSaved
            | EventType::GraphCompiled
            | EventType::GraphCacheHit => EventCategory::Orchestration,
            EventType::StageStarted
            | EventType::StageCompleted
            | EventType::StageFailed
            | EventType::StageSkipped
            | EventType::CircuitOpened => EventCategory::StageExecution,
        }
    }
}

/// Whether an event describes workflow-level orchestration or the execution
/// of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Orchestration,
    StageExecution,
}

/// Immutable observability record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub event_type: EventType,
    pub category: EventCategory,
    pub workflow_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub stage: Option<StageId>,
    pub data: serde_json::Value,
    pub execution_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl WorkflowEvent {
    pub fn new(event_type: EventType, workflow_id: Uuid, data: serde_json::Value) -> Self {
        Self {
            event_type,
            category: event_type.category(),
            workflow_id,
            timestamp: Utc::now(),
            correlation_id: None,
            stage: None,
            data,
            execution_time_ms: None,
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_stage(mut self, stage: StageId) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_derivation() {
        assert_eq!(
            EventType::WorkflowCompleted.category(),
            EventCategory::Orchestration
        );
        assert_eq!(
            EventType::StageFailed.category(),
            EventCategory::StageExecution
        );
        assert_eq!(
            EventType::CircuitOpened.category(),
            EventCategory::StageExecution
        );
    }

    #[test]
    fn test_event_serializes_with_stable_names() {
        let event = WorkflowEvent::new(
            EventType::StageCompleted,
            Uuid::new_v4(),
            serde_json::json!({"ok": true}),
        )
        .with_stage(StageId::Refiner)
        .with_execution_time(12);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "stage_completed");
        assert_eq!(json["stage"], "refiner");
        assert_eq!(json["execution_time_ms"], 12);
    }
}
