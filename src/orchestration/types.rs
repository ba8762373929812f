//! Request and result types for the top-level orchestrator.

use crate::orchestration::optimizer::{
    OptimizationStrategy, ResourceConstraints, RoutingDecision, StagePerformance,
};
use crate::orchestration::planner::{CompileStrategy, Pattern};
use crate::stages::StageId;
use crate::state::StateSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-request execution options. Everything is optional; an empty config
/// runs the classifier-routed default path.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Explicit stage list, normalized by the planner rather than trusted
    pub forced_stages: Option<Vec<StageId>>,
    pub forced_pattern: Option<Pattern>,
    pub compile_strategy: Option<CompileStrategy>,
    /// Pre-computed intent signal; malformed values degrade, never fail
    pub signal: Option<serde_json::Value>,
    /// Supplying constraints opts the request into optimizer routing
    pub constraints: Option<ResourceConstraints>,
    pub strategy: Option<OptimizationStrategy>,
    /// Historical performance data fed to the optimizer; missing entries are
    /// defaulted with a recorded data-quality risk
    pub performance: HashMap<StageId, StagePerformance>,
    /// Complexity estimate in [0,1]; out-of-range values are sanitized
    pub complexity: Option<f64>,
    /// Privacy-sensitive mode: no checkpoints, no graph-cache reuse
    pub suppress_history: bool,
    /// Per-request checkpoint override; `None` follows the crate config
    pub checkpoint_enabled: Option<bool>,
    pub correlation_id: Option<String>,
}

/// Caller-facing outcome of one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: Uuid,
    /// Best-effort final answer; present whenever the terminal stage committed
    pub answer: Option<String>,
    pub successful_stages: Vec<StageId>,
    pub failed_stages: Vec<StageId>,
    /// Routing decision when optimizer routing was active
    pub routing: Option<RoutingDecision>,
    pub state: StateSnapshot,
    pub duration_ms: u64,
}
