//! # System Constants
//!
//! Event names and operational defaults shared across the execution core.

use std::time::Duration;

/// Workflow and stage lifecycle event names.
///
/// Dotted `<subject>.<action>` names, stable across sinks so downstream
/// consumers can filter without parsing payloads.
pub mod events {
    // Workflow lifecycle
    pub const WORKFLOW_STARTED: &str = "workflow.started";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const WORKFLOW_FAILED: &str = "workflow.failed";
    pub const WORKFLOW_ROUTING_DECIDED: &str = "workflow.routing_decided";
    pub const WORKFLOW_CHECKPOINT_SAVED: &str = "workflow.checkpoint_saved";

    // Stage lifecycle
    pub const STAGE_STARTED: &str = "stage.started";
    pub const STAGE_COMPLETED: &str = "stage.completed";
    pub const STAGE_FAILED: &str = "stage.failed";
    pub const STAGE_SKIPPED: &str = "stage.skipped";
    pub const STAGE_CIRCUIT_OPENED: &str = "stage.circuit_opened";

    // Graph compilation
    pub const GRAPH_COMPILED: &str = "graph.compiled";
    pub const GRAPH_CACHE_HIT: &str = "graph.cache_hit";
}

/// System-wide defaults.
pub mod system {
    use super::Duration;

    /// Consecutive failures before a stage's circuit opens
    pub const CIRCUIT_FAILURE_THRESHOLD: u32 = 3;

    /// Cooldown before an open circuit allows a probe call
    pub const CIRCUIT_COOLDOWN: Duration = Duration::from_secs(300);

    /// Per-stage execution timeout budget
    pub const STAGE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Event emitter channel/buffer sizing
    pub const MEMORY_SINK_CAPACITY: usize = 256;

    /// File sink rotation threshold in bytes
    pub const FILE_SINK_MAX_BYTES: u64 = 10 * 1024 * 1024;

    /// Characters of stage output carried on terminal workflow events
    pub const EVENT_OUTPUT_TRUNCATION: usize = 200;
}
