//! # Orchestration Engine
//!
//! The execution core: planner, graph compiler + cache, fault-tolerant stage
//! wrapper, resource optimizer, and the top-level orchestrator driving one
//! request from query text to a caller-facing result.
//!
//! ## Core Components
//!
//! - **Planner**: decides the canonical execution pattern, entry stage, and
//!   ordered stage list from the query and caller overrides
//! - **GraphCompiler**: turns a plan into an executable DAG, cached by plan
//!   shape so repeated requests skip compilation
//! - **StageWrapper**: wraps every stage call with dependency validation, a
//!   timeout budget, a circuit breaker, timing, and the state-merge discipline
//! - **ResourceOptimizer**: scores and selects stages under hard/soft
//!   constraints, producing a routing decision with reasoning and risks
//! - **Orchestrator**: the top-level driver emitting exactly one terminal
//!   workflow event per request

pub mod compiler;
pub mod errors;
pub mod optimizer;
pub mod orchestrator;
pub mod planner;
pub mod stage_wrapper;
pub mod types;

pub use compiler::{CacheStats, ExecutableGraph, GraphCacheKey, GraphCompiler, GraphNode};
pub use errors::{OrchestrationError, OrchestrationResult};
pub use optimizer::{
    ConfidenceLevel, OptimizationStrategy, OptimizerConfig, PerformancePrediction,
    ResourceConstraints, ResourceOptimizer, Risk, RiskKind, RoutingDecision, RoutingReasoning,
    StagePerformance,
};
pub use orchestrator::Orchestrator;
pub use planner::{
    CompileStrategy, ExecutionPlan, IntentClassifier, IntentSignal, KeywordIntentClassifier,
    Pattern, PlanRequest, Planner, RouteHint,
};
pub use stage_wrapper::{StageOutcome, StageWrapper};
pub use types::{RequestConfig, WorkflowResult};
