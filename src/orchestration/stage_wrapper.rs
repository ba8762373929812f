//! # Stage Wrapper
//!
//! Every stage is invoked only through this wrapper, which layers on:
//! dependency validation against the static table, a request-scoped timeout
//! budget, the per-stage circuit breaker, wall-clock timing, and the
//! serialized state-merge discipline. Stage computation may overlap across
//! parallel stages; merges never do. The shared state is locked only for
//! the snapshot and the merge, not for the stage body.

use crate::events::{EventEmitter, EventType, WorkflowEvent};
use crate::logging;
use crate::orchestration::errors::OrchestrationError;
use crate::resilience::{CircuitBreakerError, CircuitBreakerRegistry};
use crate::stages::{StageContext, StageId, StageRegistry};
use crate::state::{dependencies, ExecutionState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Outcome of one wrapped stage call. Failures here are recorded, not
/// propagated: partial-failure tolerance is the orchestrator's default.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: StageId,
    pub succeeded: bool,
    pub duration_ms: u64,
    pub error: Option<OrchestrationError>,
}

pub struct StageWrapper {
    stages: Arc<StageRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    emitter: Arc<EventEmitter>,
    stage_timeout: Duration,
}

impl StageWrapper {
    pub fn new(
        stages: Arc<StageRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        emitter: Arc<EventEmitter>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            stages,
            breakers,
            emitter,
            stage_timeout,
        }
    }

    /// Execute one stage against the shared state, merging exactly once.
    pub async fn execute_stage(
        &self,
        stage_id: StageId,
        state: &Arc<Mutex<ExecutionState>>,
        correlation_id: Option<&str>,
    ) -> StageOutcome {
        // Snapshot inputs and validate dependencies under one short lock.
        let (context, check) = {
            let guard = state.lock().await;
            let check = dependencies::validate(&guard, stage_id);
            let context = StageContext {
                workflow_id: guard.workflow_id,
                query: guard.query.clone(),
                original_query: guard.original_query.clone(),
                upstream_outputs: StageId::ALL
                    .iter()
                    .filter_map(|s| guard.output_for(*s).map(|v| (*s, v.clone())))
                    .collect(),
                upstream_structured: StageId::ALL
                    .iter()
                    .filter_map(|s| guard.structured_output_for(*s).map(|v| (*s, v.clone())))
                    .collect(),
            };
            (context, check)
        };
        let workflow_id = context.workflow_id;

        if !check.satisfied {
            let error = OrchestrationError::MissingDependencies {
                stage: stage_id,
                missing: check.missing.clone(),
            };
            warn!(
                stage = %stage_id,
                missing = ?check.missing,
                "Skipping stage - dependencies unmet"
            );
            self.record_failure(state, stage_id, &error, None).await;
            self.emit_stage_event(
                EventType::StageSkipped,
                workflow_id,
                stage_id,
                correlation_id,
                None,
                Some(error.to_string()),
            )
            .await;
            return StageOutcome {
                stage: stage_id,
                succeeded: false,
                duration_ms: 0,
                error: Some(error),
            };
        }

        let stage = match self.stages.get(stage_id) {
            Ok(stage) => stage,
            Err(e) => {
                self.record_failure(state, stage_id, &e, None).await;
                return StageOutcome {
                    stage: stage_id,
                    succeeded: false,
                    duration_ms: 0,
                    error: Some(e),
                };
            }
        };

        self.emit_stage_event(
            EventType::StageStarted,
            workflow_id,
            stage_id,
            correlation_id,
            None,
            None,
        )
        .await;

        let breaker = self.breakers.breaker_for(stage_id);
        let timeout = self.stage_timeout;
        let started = Instant::now();

        let result = breaker
            .call(|| async {
                // Spawned so a panicking stage is contained as a recorded
                // failure instead of unwinding through the level join.
                let task = tokio::spawn(async move { stage.execute(context).await });
                match tokio::time::timeout(timeout, task).await {
                    Ok(Ok(inner)) => inner,
                    Ok(Err(join_error)) => Err(OrchestrationError::StageExecutionFailed {
                        stage: stage_id,
                        message: format!("stage task aborted: {join_error}"),
                    }),
                    Err(_) => Err(OrchestrationError::StageTimeout {
                        stage: stage_id,
                        timeout,
                    }),
                }
            })
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(update) => {
                {
                    let mut guard = state.lock().await;
                    guard.merge_success(stage_id, update, duration_ms);
                }
                logging::log_stage_operation(
                    "stage_execution",
                    &workflow_id.to_string(),
                    stage_id.as_str(),
                    "completed",
                    Some(duration_ms),
                    None,
                );
                self.emit_stage_event(
                    EventType::StageCompleted,
                    workflow_id,
                    stage_id,
                    correlation_id,
                    Some(duration_ms),
                    None,
                )
                .await;
                StageOutcome {
                    stage: stage_id,
                    succeeded: true,
                    duration_ms,
                    error: None,
                }
            }
            Err(CircuitBreakerError::CircuitOpen {
                remaining_cooldown, ..
            }) => {
                let error = OrchestrationError::CircuitOpen {
                    stage: stage_id,
                    remaining_cooldown,
                };
                self.record_failure(state, stage_id, &error, None).await;
                self.emit_stage_event(
                    EventType::CircuitOpened,
                    workflow_id,
                    stage_id,
                    correlation_id,
                    None,
                    Some(error.to_string()),
                )
                .await;
                StageOutcome {
                    stage: stage_id,
                    succeeded: false,
                    duration_ms: 0,
                    error: Some(error),
                }
            }
            Err(CircuitBreakerError::OperationFailed(error)) => {
                logging::log_stage_operation(
                    "stage_execution",
                    &workflow_id.to_string(),
                    stage_id.as_str(),
                    "failed",
                    Some(duration_ms),
                    Some(&error.to_string()),
                );
                self.record_failure(state, stage_id, &error, Some(duration_ms))
                    .await;
                self.emit_stage_event(
                    EventType::StageFailed,
                    workflow_id,
                    stage_id,
                    correlation_id,
                    Some(duration_ms),
                    Some(error.to_string()),
                )
                .await;
                StageOutcome {
                    stage: stage_id,
                    succeeded: false,
                    duration_ms,
                    error: Some(error),
                }
            }
        }
    }

    async fn record_failure(
        &self,
        state: &Arc<Mutex<ExecutionState>>,
        stage_id: StageId,
        error: &OrchestrationError,
        duration_ms: Option<u64>,
    ) {
        let mut guard = state.lock().await;
        guard.merge_failure(stage_id, error.kind(), error.to_string(), duration_ms);
    }

    async fn emit_stage_event(
        &self,
        event_type: EventType,
        workflow_id: uuid::Uuid,
        stage_id: StageId,
        correlation_id: Option<&str>,
        duration_ms: Option<u64>,
        error: Option<String>,
    ) {
        let mut event = WorkflowEvent::new(event_type, workflow_id, serde_json::json!({}))
            .with_stage(stage_id)
            .with_correlation_id(correlation_id.map(str::to_string));
        if let Some(ms) = duration_ms {
            event = event.with_execution_time(ms);
        }
        if let Some(error) = error {
            event = event.with_error(error);
        }
        self.emitter.emit(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::errors::OrchestrationResult;
    use crate::resilience::CircuitBreakerConfig;
    use crate::stages::Stage;
    use crate::state::StateUpdate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct FlakyStage {
        id: StageId,
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait::async_trait]
    impl Stage for FlakyStage {
        fn id(&self) -> StageId {
            self.id
        }

        async fn execute(&self, _ctx: StageContext) -> OrchestrationResult<StateUpdate> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(OrchestrationError::StageExecutionFailed {
                    stage: self.id,
                    message: "collaborator unavailable".to_string(),
                })
            } else {
                Ok(StateUpdate {
                    output: Some(serde_json::json!({"ok": true})),
                    ..Default::default()
                })
            }
        }
    }

    struct SlowStage;

    #[async_trait::async_trait]
    impl Stage for SlowStage {
        fn id(&self) -> StageId {
            StageId::Refiner
        }

        async fn execute(&self, _ctx: StageContext) -> OrchestrationResult<StateUpdate> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(StateUpdate::default())
        }
    }

    fn wrapper_with(
        stage: Arc<dyn Stage>,
        timeout: Duration,
        breaker_threshold: u32,
    ) -> (StageWrapper, Arc<Mutex<ExecutionState>>) {
        let mut registry = StageRegistry::new();
        registry.register(stage);
        let wrapper = StageWrapper::new(
            Arc::new(registry),
            Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
                failure_threshold: breaker_threshold,
                cooldown: Duration::from_secs(300),
                success_threshold: 1,
            })),
            Arc::new(EventEmitter::new()),
            timeout,
        );
        let state = Arc::new(Mutex::new(ExecutionState::new(Uuid::new_v4(), "query")));
        (wrapper, state)
    }

    #[tokio::test]
    async fn test_successful_stage_merges_once_with_timing() {
        let stage = Arc::new(FlakyStage {
            id: StageId::Refiner,
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let (wrapper, state) = wrapper_with(stage, Duration::from_secs(5), 3);

        let outcome = wrapper.execute_stage(StageId::Refiner, &state, None).await;
        assert!(outcome.succeeded);

        let guard = state.lock().await;
        assert!(guard.has_succeeded(StageId::Refiner));
        assert!(guard
            .metadata_for(StageId::Refiner)
            .unwrap()
            .execution_time_ms
            .is_some());
    }

    #[tokio::test]
    async fn test_unmet_dependency_fails_without_invoking_stage() {
        let stage = Arc::new(FlakyStage {
            id: StageId::Critic,
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let calls_handle = stage.clone();
        let (wrapper, state) = wrapper_with(stage, Duration::from_secs(5), 3);

        let outcome = wrapper.execute_stage(StageId::Critic, &state, None).await;
        assert!(!outcome.succeeded);
        assert!(matches!(
            outcome.error,
            Some(OrchestrationError::MissingDependencies { .. })
        ));
        assert_eq!(calls_handle.calls.load(Ordering::SeqCst), 0);

        let guard = state.lock().await;
        assert_eq!(guard.errors()[0].kind, "missing_dependency");
    }

    #[tokio::test]
    async fn test_timeout_counts_toward_circuit_breaker() {
        let (wrapper, state) = wrapper_with(Arc::new(SlowStage), Duration::from_millis(20), 2);

        for _ in 0..2 {
            let outcome = wrapper.execute_stage(StageId::Refiner, &state, None).await;
            assert!(matches!(
                outcome.error,
                Some(OrchestrationError::StageTimeout { .. })
            ));
        }

        // Breaker is now open: third call fails fast with a distinguishable error
        let outcome = wrapper.execute_stage(StageId::Refiner, &state, None).await;
        assert!(matches!(
            outcome.error,
            Some(OrchestrationError::CircuitOpen { .. })
        ));
    }

    struct PanickyStage;

    #[async_trait::async_trait]
    impl Stage for PanickyStage {
        fn id(&self) -> StageId {
            StageId::Refiner
        }

        async fn execute(&self, _ctx: StageContext) -> OrchestrationResult<StateUpdate> {
            panic!("stage blew up");
        }
    }

    #[tokio::test]
    async fn test_stage_panic_is_contained_as_failure() {
        let (wrapper, state) = wrapper_with(Arc::new(PanickyStage), Duration::from_secs(5), 3);

        let outcome = wrapper.execute_stage(StageId::Refiner, &state, None).await;
        assert!(!outcome.succeeded);
        assert!(matches!(
            outcome.error,
            Some(OrchestrationError::StageExecutionFailed { .. })
        ));

        let guard = state.lock().await;
        assert_eq!(guard.failed_stages(), &[StageId::Refiner]);
    }

    #[tokio::test]
    async fn test_failures_below_threshold_keep_invoking_stage() {
        let stage = Arc::new(FlakyStage {
            id: StageId::Refiner,
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        let calls_handle = stage.clone();
        let (wrapper, state) = wrapper_with(stage, Duration::from_secs(5), 3);

        // Two failures stay below the threshold of 3
        for _ in 0..2 {
            let outcome = wrapper.execute_stage(StageId::Refiner, &state, None).await;
            assert!(!outcome.succeeded);
        }
        // Third call is invoked normally and succeeds
        let outcome = wrapper.execute_stage(StageId::Refiner, &state, None).await;
        assert!(outcome.succeeded);
        assert_eq!(calls_handle.calls.load(Ordering::SeqCst), 3);
    }
}
