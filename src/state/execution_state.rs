//! Per-request execution state and the merge discipline stages use to update it.
//!
//! Exactly one logical owner (the orchestrator) creates an [`ExecutionState`].
//! Stages contribute [`StateUpdate`] values which are merged in by the stage
//! wrapper: list-valued bookkeeping is additive (union, order-preserving) and
//! scalar fields are last-writer-wins, so stages that legitimately run out of
//! strict order cannot erase each other's contributions.

use crate::orchestration::optimizer::RoutingDecision;
use crate::orchestration::planner::{CompileStrategy, Pattern};
use crate::stages::StageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-stage routing and timing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageMetadata {
    pub routing_reason: Option<String>,
    pub execution_time_ms: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

/// One recorded error, attached to the state before any propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionErrorRecord {
    pub stage: Option<StageId>,
    /// Stable error kind for downstream filtering (e.g. "timeout", "circuit_open")
    pub kind: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Nested per-request configuration block carried inside the state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    pub pattern: Option<Pattern>,
    pub compile_strategy: Option<CompileStrategy>,
    /// Privacy-sensitive mode: no checkpoints, no graph-cache reuse
    pub suppress_history: bool,
    pub checkpoint_enabled: bool,
    /// Optimizer decision when constraint-based routing was active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
}

/// The shared, mutable record for one request.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub workflow_id: Uuid,
    /// Current working query; upstream stages may rewrite it
    pub query: String,
    /// Query exactly as submitted
    pub original_query: String,
    pub config: StateConfig,
    outputs: HashMap<StageId, serde_json::Value>,
    structured_outputs: HashMap<StageId, serde_json::Value>,
    metadata: HashMap<StageId, StageMetadata>,
    successful_stages: Vec<StageId>,
    failed_stages: Vec<StageId>,
    errors: Vec<ExecutionErrorRecord>,
    created_at: DateTime<Utc>,
}

/// Partial update returned by one stage execution.
///
/// `None` fields leave the corresponding state untouched.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    /// Rewritten working query (refiner)
    pub query: Option<String>,
    /// Opaque per-stage output
    pub output: Option<serde_json::Value>,
    /// Structured per-stage output (e.g. result rows)
    pub structured_output: Option<serde_json::Value>,
    /// Why routing placed this stage in the path
    pub routing_reason: Option<String>,
}

impl ExecutionState {
    pub fn new(workflow_id: Uuid, query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            workflow_id,
            original_query: query.clone(),
            query,
            config: StateConfig::default(),
            outputs: HashMap::new(),
            structured_outputs: HashMap::new(),
            metadata: HashMap::new(),
            successful_stages: Vec::new(),
            failed_stages: Vec::new(),
            errors: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Merge a successful stage's update. Additive for lists, last-writer-wins
    /// for scalars; the success bookkeeping is a union so out-of-order merges
    /// from parallel stages never drop each other.
    pub fn merge_success(
        &mut self,
        stage: StageId,
        update: StateUpdate,
        execution_time_ms: u64,
    ) {
        if let Some(query) = update.query {
            self.query = query;
        }
        if let Some(output) = update.output {
            self.outputs.insert(stage, output);
        }
        if let Some(structured) = update.structured_output {
            self.structured_outputs.insert(stage, structured);
        }
        self.metadata.insert(
            stage,
            StageMetadata {
                routing_reason: update.routing_reason,
                execution_time_ms: Some(execution_time_ms),
                recorded_at: Utc::now(),
            },
        );
        push_unique(&mut self.successful_stages, stage);
    }

    /// Record a stage failure. The failed-stage list is additive as well.
    pub fn merge_failure(
        &mut self,
        stage: StageId,
        kind: impl Into<String>,
        message: impl Into<String>,
        execution_time_ms: Option<u64>,
    ) {
        self.metadata.insert(
            stage,
            StageMetadata {
                routing_reason: None,
                execution_time_ms,
                recorded_at: Utc::now(),
            },
        );
        push_unique(&mut self.failed_stages, stage);
        self.errors.push(ExecutionErrorRecord {
            stage: Some(stage),
            kind: kind.into(),
            message: message.into(),
            occurred_at: Utc::now(),
        });
    }

    /// Record a workflow-level error not attributable to a single stage.
    pub fn record_error(&mut self, kind: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ExecutionErrorRecord {
            stage: None,
            kind: kind.into(),
            message: message.into(),
            occurred_at: Utc::now(),
        });
    }

    pub fn output_for(&self, stage: StageId) -> Option<&serde_json::Value> {
        self.outputs.get(&stage)
    }

    pub fn structured_output_for(&self, stage: StageId) -> Option<&serde_json::Value> {
        self.structured_outputs.get(&stage)
    }

    pub fn metadata_for(&self, stage: StageId) -> Option<&StageMetadata> {
        self.metadata.get(&stage)
    }

    pub fn successful_stages(&self) -> &[StageId] {
        &self.successful_stages
    }

    pub fn failed_stages(&self) -> &[StageId] {
        &self.failed_stages
    }

    pub fn errors(&self) -> &[ExecutionErrorRecord] {
        &self.errors
    }

    pub fn has_succeeded(&self, stage: StageId) -> bool {
        self.successful_stages.contains(&stage)
    }

    /// Immutable snapshot for checkpointing and caller-facing results.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            workflow_id: self.workflow_id,
            query: self.query.clone(),
            original_query: self.original_query.clone(),
            config: self.config.clone(),
            outputs: self.outputs.clone(),
            structured_outputs: self.structured_outputs.clone(),
            metadata: self.metadata.clone(),
            successful_stages: self.successful_stages.clone(),
            failed_stages: self.failed_stages.clone(),
            errors: self.errors.clone(),
            created_at: self.created_at,
            captured_at: Utc::now(),
        }
    }
}

fn push_unique(list: &mut Vec<StageId>, stage: StageId) {
    if !list.contains(&stage) {
        list.push(stage);
    }
}

/// Serializable point-in-time copy of an [`ExecutionState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub workflow_id: Uuid,
    pub query: String,
    pub original_query: String,
    pub config: StateConfig,
    pub outputs: HashMap<StageId, serde_json::Value>,
    pub structured_outputs: HashMap<StageId, serde_json::Value>,
    pub metadata: HashMap<StageId, StageMetadata>,
    pub successful_stages: Vec<StageId>,
    pub failed_stages: Vec<StageId>,
    pub errors: Vec<ExecutionErrorRecord>,
    pub created_at: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> ExecutionState {
        ExecutionState::new(Uuid::new_v4(), "what are the library opening hours?")
    }

    #[test]
    fn test_merge_success_records_output_and_bookkeeping() {
        let mut state = state();
        let update = StateUpdate {
            query: Some("library opening hours".to_string()),
            output: Some(json!({"refined_query": "library opening hours"})),
            ..Default::default()
        };
        state.merge_success(StageId::Refiner, update, 42);

        assert_eq!(state.query, "library opening hours");
        assert_eq!(state.original_query, "what are the library opening hours?");
        assert!(state.has_succeeded(StageId::Refiner));
        assert_eq!(
            state.metadata_for(StageId::Refiner).unwrap().execution_time_ms,
            Some(42)
        );
    }

    #[test]
    fn test_successful_stage_list_is_additive_regardless_of_order() {
        // Critic and historian may merge in either order after running
        // concurrently; both must survive.
        let mut forward = state();
        forward.merge_success(StageId::Critic, StateUpdate::default(), 1);
        forward.merge_success(StageId::Historian, StateUpdate::default(), 1);

        let mut reverse = state();
        reverse.merge_success(StageId::Historian, StateUpdate::default(), 1);
        reverse.merge_success(StageId::Critic, StateUpdate::default(), 1);

        for merged in [&forward, &reverse] {
            assert!(merged.has_succeeded(StageId::Critic));
            assert!(merged.has_succeeded(StageId::Historian));
            assert_eq!(merged.successful_stages().len(), 2);
        }
    }

    #[test]
    fn test_repeated_merge_does_not_duplicate_bookkeeping() {
        let mut state = state();
        state.merge_success(StageId::Refiner, StateUpdate::default(), 1);
        state.merge_success(StageId::Refiner, StateUpdate::default(), 2);
        assert_eq!(state.successful_stages(), &[StageId::Refiner]);
    }

    #[test]
    fn test_merge_failure_attaches_error_record() {
        let mut state = state();
        state.merge_failure(StageId::Critic, "timeout", "language model timed out", Some(500));
        assert_eq!(state.failed_stages(), &[StageId::Critic]);
        assert_eq!(state.errors().len(), 1);
        assert_eq!(state.errors()[0].kind, "timeout");
        assert_eq!(state.errors()[0].stage, Some(StageId::Critic));
    }

    #[test]
    fn test_snapshot_is_serializable() {
        let mut state = state();
        state.merge_success(
            StageId::DataQuery,
            StateUpdate {
                structured_output: Some(json!([{"consent_type": "Data sharing"}])),
                ..Default::default()
            },
            7,
        );
        let snapshot = state.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("data_query"));
    }
}
