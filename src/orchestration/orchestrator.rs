//! # Workflow Orchestrator
//!
//! The top-level driver for one request: plan, optionally narrow the route
//! through the resource optimizer, compile (or fetch) the executable graph,
//! walk its levels with parallel stage execution, checkpoint around the walk,
//! and emit exactly one terminal workflow event.
//!
//! ## Execution Contract
//!
//! - Stage failures are recorded and tolerated; the walk continues and the
//!   terminal stage synthesizes from whatever committed
//! - Only validation, graph compilation, and total failure (no stage
//!   committed) surface as errors to the caller
//! - `suppress_history` disables checkpoints and graph-cache reuse for the
//!   request without touching any other request

use crate::config::ScholarConfig;
use crate::constants::system;
use crate::events::{EventEmitter, EventType, WorkflowEvent};
use crate::interfaces::CheckpointStore;
use crate::logging;
use crate::orchestration::compiler::{CacheStats, GraphCompiler};
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::orchestration::optimizer::{OptimizationStrategy, ResourceOptimizer, RoutingDecision};
use crate::orchestration::planner::{CompileStrategy, ExecutionPlan, PlanRequest, Planner};
use crate::orchestration::stage_wrapper::StageWrapper;
use crate::orchestration::types::{RequestConfig, WorkflowResult};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};
use crate::stages::{StageId, StageRegistry};
use crate::state::{ExecutionState, StateConfig};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use uuid::Uuid;

pub struct Orchestrator {
    config: ScholarConfig,
    planner: Planner,
    compiler: GraphCompiler,
    optimizer: ResourceOptimizer,
    breakers: Arc<CircuitBreakerRegistry>,
    emitter: Arc<EventEmitter>,
    wrapper: StageWrapper,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl Orchestrator {
    pub fn new(config: ScholarConfig, stages: Arc<StageRegistry>, emitter: Arc<EventEmitter>) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_failure_threshold,
            cooldown: config.circuit_cooldown,
            success_threshold: 1,
        }));
        let wrapper = StageWrapper::new(
            stages,
            breakers.clone(),
            emitter.clone(),
            config.stage_timeout,
        );
        Self {
            config,
            planner: Planner::new(),
            compiler: GraphCompiler::new(),
            optimizer: ResourceOptimizer::new(),
            breakers,
            emitter,
            wrapper,
            checkpoints: None,
        }
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    /// Graph-cache counters, observable for diagnostics and tests.
    pub fn cache_stats(&self) -> CacheStats {
        self.compiler.stats()
    }

    pub fn invalidate_graph_cache(&self) {
        self.compiler.invalidate();
    }

    /// Circuit state per stage that has been invoked at least once.
    pub fn circuit_states(&self) -> Vec<(StageId, CircuitState)> {
        self.breakers.states()
    }

    /// Execute one request end to end.
    #[instrument(skip(self, request), fields(query_len = query.len()))]
    pub async fn execute(
        &self,
        query: &str,
        request: RequestConfig,
    ) -> OrchestrationResult<WorkflowResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(OrchestrationError::ValidationFailed(
                "query must not be empty".to_string(),
            ));
        }

        let workflow_id = Uuid::new_v4();
        let started = Instant::now();
        let correlation_id = request.correlation_id.as_deref();
        let mut state = ExecutionState::new(workflow_id, query);

        self.emit(
            EventType::WorkflowStarted,
            workflow_id,
            correlation_id,
            serde_json::json!({
                "query": truncate(query),
                "suppress_history": request.suppress_history,
            }),
            None,
        )
        .await;

        let (plan, routing) = self.route(&state, &request, workflow_id, correlation_id).await;

        let suppress = request.suppress_history;
        let checkpoint_enabled = request
            .checkpoint_enabled
            .unwrap_or(self.config.checkpoints_enabled)
            && !suppress;
        let cache_enabled = self.config.graph_cache_enabled && !suppress;

        state.config = StateConfig {
            pattern: Some(plan.pattern),
            compile_strategy: Some(plan.compile_strategy),
            suppress_history: suppress,
            checkpoint_enabled,
            routing: routing.clone(),
        };

        let before = self.compiler.stats();
        let graph = match self.compiler.compile(&plan, checkpoint_enabled, cache_enabled) {
            Ok(graph) => graph,
            Err(e) => {
                logging::log_error(
                    "orchestrator",
                    "graph_compilation",
                    &e.to_string(),
                    Some(&plan.routing_key),
                );
                self.emit(
                    EventType::WorkflowFailed,
                    workflow_id,
                    correlation_id,
                    serde_json::json!({"routing_key": plan.routing_key}),
                    Some(e.to_string()),
                )
                .await;
                return Err(e);
            }
        };
        let compile_event = if self.compiler.stats().hits > before.hits {
            EventType::GraphCacheHit
        } else {
            EventType::GraphCompiled
        };
        self.emit(
            compile_event,
            workflow_id,
            correlation_id,
            serde_json::json!({
                "routing_key": plan.routing_key,
                "stages": graph.stages(),
                "levels": graph.levels.len(),
            }),
            None,
        )
        .await;

        let state = Arc::new(Mutex::new(state));

        self.save_checkpoint(&state, checkpoint_enabled, "pre_execution", correlation_id)
            .await;

        for level in &graph.levels {
            let outcomes = join_all(level.iter().map(|stage| {
                self.wrapper.execute_stage(*stage, &state, correlation_id)
            }))
            .await;
            for outcome in &outcomes {
                if let Some(error) = &outcome.error {
                    warn!(
                        stage = %outcome.stage,
                        error = %error,
                        "Stage failed - continuing under partial-failure tolerance"
                    );
                }
            }
        }

        self.save_checkpoint(&state, checkpoint_enabled, "post_execution", correlation_id)
            .await;

        let snapshot = {
            let guard = state.lock().await;
            guard.snapshot()
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let answer = snapshot
            .outputs
            .get(&StageId::Synthesizer)
            .and_then(|v| v.get("final_answer"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        if snapshot.successful_stages.is_empty() {
            let detail = format!(
                "all {} planned stages failed",
                snapshot.failed_stages.len()
            );
            logging::log_workflow_operation(
                "workflow_execution",
                &workflow_id.to_string(),
                Some(&plan.pattern.to_string()),
                "failed",
                Some(&detail),
            );
            self.emit(
                EventType::WorkflowFailed,
                workflow_id,
                correlation_id,
                serde_json::json!({
                    "failed_stages": snapshot.failed_stages,
                    "duration_ms": duration_ms,
                }),
                Some(detail.clone()),
            )
            .await;
            return Err(OrchestrationError::WorkflowFailed(detail));
        }

        logging::log_workflow_operation(
            "workflow_execution",
            &workflow_id.to_string(),
            Some(&plan.pattern.to_string()),
            "completed",
            Some(&format!(
                "{} succeeded, {} failed, {duration_ms}ms",
                snapshot.successful_stages.len(),
                snapshot.failed_stages.len()
            )),
        );
        self.emit(
            EventType::WorkflowCompleted,
            workflow_id,
            correlation_id,
            serde_json::json!({
                "answer": answer.as_deref().map(truncate),
                "successful_stages": snapshot.successful_stages,
                "failed_stages": snapshot.failed_stages,
                "duration_ms": duration_ms,
            }),
            None,
        )
        .await;

        Ok(WorkflowResult {
            workflow_id,
            answer,
            successful_stages: snapshot.successful_stages.clone(),
            failed_stages: snapshot.failed_stages.clone(),
            routing,
            state: snapshot,
            duration_ms,
        })
    }

    /// Plan the route, narrowing through the optimizer when the caller
    /// supplied constraints.
    async fn route(
        &self,
        state: &ExecutionState,
        request: &RequestConfig,
        workflow_id: Uuid,
        correlation_id: Option<&str>,
    ) -> (ExecutionPlan, Option<RoutingDecision>) {
        let plan_request = PlanRequest {
            forced_stages: request.forced_stages.clone(),
            forced_pattern: request.forced_pattern,
            compile_strategy: request.compile_strategy,
            signal: request.signal.clone(),
        };
        let plan = self.planner.plan(state, &plan_request);

        let Some(constraints) = &request.constraints else {
            return (plan, None);
        };

        // The plan's entry stage anchors the route; the optimizer must treat
        // it as required so constraint conflicts surface as explicit risks.
        let mut constraints = constraints.clone();
        constraints.required.insert(plan.entry_point);

        let decision = self.optimizer.select(
            &plan.stages,
            request.complexity.unwrap_or(0.5),
            &request.performance,
            &constraints,
            request.strategy.unwrap_or(OptimizationStrategy::Balanced),
        );

        self.emit(
            EventType::RoutingDecided,
            workflow_id,
            correlation_id,
            serde_json::to_value(&decision).unwrap_or(serde_json::Value::Null),
            None,
        )
        .await;

        // Recompile the plan around the selected subset. Narrowed routes
        // compile only their own stages unless the caller asked otherwise.
        let narrowed = PlanRequest {
            forced_stages: Some(decision.selected_stages.clone()),
            forced_pattern: Some(plan.pattern),
            compile_strategy: Some(
                request.compile_strategy.unwrap_or(CompileStrategy::Default),
            ),
            signal: request.signal.clone(),
        };
        let plan = self.planner.plan(state, &narrowed);
        (plan, Some(decision))
    }

    async fn save_checkpoint(
        &self,
        state: &Arc<Mutex<ExecutionState>>,
        enabled: bool,
        label: &str,
        correlation_id: Option<&str>,
    ) {
        if !enabled {
            return;
        }
        let Some(store) = &self.checkpoints else {
            return;
        };
        let snapshot = {
            let guard = state.lock().await;
            guard.snapshot()
        };
        let thread_id = snapshot.workflow_id.to_string();
        match store.save(&thread_id, &snapshot, label).await {
            Ok(()) => {
                self.emit(
                    EventType::CheckpointSaved,
                    snapshot.workflow_id,
                    correlation_id,
                    serde_json::json!({"label": label}),
                    None,
                )
                .await;
            }
            Err(e) => {
                // Checkpointing is best-effort and never blocks execution
                warn!(label = label, error = %e, "Checkpoint save failed - continuing");
            }
        }
    }

    async fn emit(
        &self,
        event_type: EventType,
        workflow_id: Uuid,
        correlation_id: Option<&str>,
        data: serde_json::Value,
        error: Option<String>,
    ) {
        let mut event = WorkflowEvent::new(event_type, workflow_id, data)
            .with_correlation_id(correlation_id.map(str::to_string));
        if let Some(error) = error {
            event = event.with_error(error);
        }
        self.emitter.emit(event).await;
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(system::EVENT_OUTPUT_TRUNCATION).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::optimizer::ResourceConstraints;
    use crate::stages::{Stage, StageContext};
    use crate::state::{StateSnapshot, StateUpdate};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OkStage {
        id: StageId,
    }

    #[async_trait::async_trait]
    impl Stage for OkStage {
        fn id(&self) -> StageId {
            self.id
        }

        async fn execute(&self, ctx: StageContext) -> OrchestrationResult<StateUpdate> {
            let output = if self.id == StageId::Synthesizer {
                serde_json::json!({"final_answer": format!("answer to: {}", ctx.original_query)})
            } else {
                serde_json::json!({"ok": true})
            };
            Ok(StateUpdate {
                output: Some(output),
                ..Default::default()
            })
        }
    }

    struct FailStage {
        id: StageId,
    }

    #[async_trait::async_trait]
    impl Stage for FailStage {
        fn id(&self) -> StageId {
            self.id
        }

        async fn execute(&self, _ctx: StageContext) -> OrchestrationResult<StateUpdate> {
            Err(OrchestrationError::StageExecutionFailed {
                stage: self.id,
                message: "collaborator unavailable".to_string(),
            })
        }
    }

    struct CountingCheckpointStore {
        saves: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CheckpointStore for CountingCheckpointStore {
        async fn save(
            &self,
            _thread_id: &str,
            _state: &StateSnapshot,
            _label: &str,
        ) -> anyhow::Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn all_ok_registry() -> Arc<StageRegistry> {
        let mut registry = StageRegistry::new();
        for stage in StageId::ALL {
            registry.register(Arc::new(OkStage { id: stage }));
        }
        Arc::new(registry)
    }

    fn orchestrator(stages: Arc<StageRegistry>) -> Orchestrator {
        Orchestrator::new(
            ScholarConfig::for_testing(),
            stages,
            Arc::new(EventEmitter::new()),
        )
    }

    #[tokio::test]
    async fn test_standard_workflow_completes_with_answer() {
        let orchestrator = orchestrator(all_ok_registry());
        let result = orchestrator
            .execute(
                "what documents do I need for enrollment?",
                RequestConfig::default(),
            )
            .await
            .unwrap();

        assert!(result.answer.unwrap().contains("enrollment"));
        assert!(result.successful_stages.contains(&StageId::Refiner));
        assert!(result.successful_stages.contains(&StageId::Synthesizer));
        assert!(result.failed_stages.is_empty());
        assert!(result.routing.is_none());
    }

    #[tokio::test]
    async fn test_data_query_fast_path_executes_only_planned_stages() {
        let orchestrator = orchestrator(all_ok_registry());
        let result = orchestrator
            .execute(
                "show consents where consent_type starts with D",
                RequestConfig::default(),
            )
            .await
            .unwrap();

        // Default superset compilation must not schedule stages outside the
        // fast-path plan
        assert_eq!(
            result.successful_stages,
            vec![StageId::DataQuery, StageId::Synthesizer]
        );
        assert!(result.failed_stages.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_before_any_stage() {
        let orchestrator = orchestrator(all_ok_registry());
        let err = orchestrator
            .execute("   ", RequestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_partial_failure_still_synthesizes() {
        let mut registry = StageRegistry::new();
        for stage in StageId::ALL {
            if stage == StageId::Critic {
                registry.register(Arc::new(FailStage { id: stage }));
            } else {
                registry.register(Arc::new(OkStage { id: stage }));
            }
        }
        let orchestrator = orchestrator(Arc::new(registry));

        let result = orchestrator
            .execute("what documents do I need?", RequestConfig::default())
            .await
            .unwrap();

        assert!(result.failed_stages.contains(&StageId::Critic));
        assert!(result.answer.is_some());
        assert!(result.successful_stages.contains(&StageId::Synthesizer));
    }

    #[tokio::test]
    async fn test_total_failure_surfaces_as_error() {
        let mut registry = StageRegistry::new();
        for stage in StageId::ALL {
            registry.register(Arc::new(FailStage { id: stage }));
        }
        let orchestrator = orchestrator(Arc::new(registry));

        let err = orchestrator
            .execute("anything at all", RequestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::WorkflowFailed(_)));
    }

    #[tokio::test]
    async fn test_suppress_history_disables_cache_and_checkpoints() {
        let store = Arc::new(CountingCheckpointStore {
            saves: AtomicUsize::new(0),
        });
        let orchestrator =
            orchestrator(all_ok_registry()).with_checkpoint_store(store.clone());
        let request = RequestConfig {
            suppress_history: true,
            ..Default::default()
        };

        for _ in 0..2 {
            orchestrator
                .execute("what documents do I need?", request.clone())
                .await
                .unwrap();
        }

        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
        let stats = orchestrator.cache_stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.entries, 0);

        // The same request without suppression checkpoints around the walk
        orchestrator
            .execute("what documents do I need?", RequestConfig::default())
            .await
            .unwrap();
        assert_eq!(store.saves.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_requests_share_a_cached_graph() {
        let orchestrator = orchestrator(all_ok_registry());
        for _ in 0..3 {
            orchestrator
                .execute("what documents do I need?", RequestConfig::default())
                .await
                .unwrap();
        }
        let stats = orchestrator.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }

    #[tokio::test]
    async fn test_constraints_narrow_route_and_record_decision() {
        let orchestrator = orchestrator(all_ok_registry());
        let request = RequestConfig {
            constraints: Some(ResourceConstraints {
                forbidden: [StageId::Critic, StageId::Historian].into_iter().collect(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = orchestrator
            .execute("what documents do I need for enrollment?", request)
            .await
            .unwrap();

        let routing = result.routing.unwrap();
        assert!(!routing.selected_stages.contains(&StageId::Critic));
        assert!(!result.successful_stages.contains(&StageId::Critic));
        assert!(!result.successful_stages.contains(&StageId::Historian));
        assert!(result.successful_stages.contains(&StageId::Refiner));
        assert!(result.answer.is_some());
    }
}
