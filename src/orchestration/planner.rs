//! # Planner
//!
//! Decides, once per request, which canonical execution pattern applies,
//! where the graph is rooted, and which stages run in what order.
//!
//! Two hard contracts hold everywhere:
//! - `Pattern` is a closed enumeration of exactly two canonical patterns.
//!   A "broader capability set" is expressed only through the orthogonal
//!   [`CompileStrategy`] field, never as a third pattern value.
//! - Planning is idempotent: identical input state yields an equivalent plan,
//!   which the graph cache downstream relies on.

use crate::stages::StageId;
use crate::state::ExecutionState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Canonical shape of the DAG for a request. Closed set; match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    /// Free-form question: refine, review, contextualize, synthesize
    Standard,
    /// Structured database-query fast path
    DataQuery,
}

impl Pattern {
    pub fn entry_point(&self) -> StageId {
        match self {
            Pattern::Standard => StageId::Refiner,
            Pattern::DataQuery => StageId::DataQuery,
        }
    }

    pub fn canonical_stages(&self) -> Vec<StageId> {
        match self {
            Pattern::Standard => vec![
                StageId::Refiner,
                StageId::Critic,
                StageId::Historian,
                StageId::Synthesizer,
            ],
            Pattern::DataQuery => vec![StageId::DataQuery, StageId::Synthesizer],
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Standard => f.write_str("standard"),
            Pattern::DataQuery => f.write_str("data_query"),
        }
    }
}

/// How broad a capability set the compiled graph supports. Orthogonal to
/// [`Pattern`] by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileStrategy {
    /// Only the plan's own stages are compiled in
    Default,
    /// The graph carries the full stage capability set
    Superset,
}

impl fmt::Display for CompileStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileStrategy::Default => f.write_str("default"),
            CompileStrategy::Superset => f.write_str("superset"),
        }
    }
}

/// Routing hint supplied by an upstream intent classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteHint {
    StructuredQuery,
    FreeForm,
}

/// Signal consumed by the planner; external classifiers produce this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentSignal {
    pub route: RouteHint,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Narrow seam for keyword/heuristic intent classification.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, query: &str) -> IntentSignal;
}

/// Default heuristic classifier: spots structured-query shapes by keyword.
#[derive(Debug, Default)]
pub struct KeywordIntentClassifier;

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, query: &str) -> IntentSignal {
        let lowered = query.to_lowercase();
        let imperative = ["show ", "list ", "count ", "find "]
            .iter()
            .any(|prefix| lowered.starts_with(prefix));
        let predicate = lowered.contains(" where ")
            || lowered.contains(" starts with ")
            || lowered.contains(" equals ");

        if predicate || (imperative && lowered.contains(" with ")) {
            IntentSignal {
                route: RouteHint::StructuredQuery,
                detail: Some("query shape matches a structured read".to_string()),
            }
        } else {
            IntentSignal {
                route: RouteHint::FreeForm,
                detail: None,
            }
        }
    }
}

/// Caller-supplied overrides for one request.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    /// Explicit stage list; normalized rather than trusted verbatim
    pub forced_stages: Option<Vec<StageId>>,
    pub forced_pattern: Option<Pattern>,
    pub compile_strategy: Option<CompileStrategy>,
    /// Pre-computed intent signal; malformed values degrade, never fail
    pub signal: Option<serde_json::Value>,
}

/// Immutable decision record produced once per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub pattern: Pattern,
    pub entry_point: StageId,
    pub stages: Vec<StageId>,
    pub compile_strategy: CompileStrategy,
    pub routing_key: String,
    pub route_locked: bool,
    /// Observability only; not consumed by downstream logic
    pub reason: String,
    pub signals: serde_json::Value,
}

pub struct Planner {
    classifier: Arc<dyn IntentClassifier>,
}

impl Planner {
    pub fn new() -> Self {
        Self {
            classifier: Arc::new(KeywordIntentClassifier),
        }
    }

    pub fn with_classifier(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self { classifier }
    }

    /// Produce the execution plan for one request. Never fails: malformed
    /// optional signals degrade to the safe default pattern with the
    /// degradation recorded in `reason`.
    pub fn plan(&self, state: &ExecutionState, request: &PlanRequest) -> ExecutionPlan {
        let compile_strategy = request
            .compile_strategy
            .unwrap_or(CompileStrategy::Superset);

        if let Some(forced) = request
            .forced_stages
            .as_deref()
            .filter(|stages| !stages.is_empty())
        {
            return self.plan_forced(state, request, forced, compile_strategy);
        }

        let (pattern, reason, signal) = self.derive_route(state, request);
        let pattern = request.forced_pattern.unwrap_or(pattern);
        let stages = pattern.canonical_stages();
        let entry_point = pattern.entry_point();

        debug!(
            pattern = %pattern,
            entry_point = %entry_point,
            compile_strategy = %compile_strategy,
            "🧭 Planned execution route"
        );

        ExecutionPlan {
            routing_key: routing_key(pattern, entry_point, compile_strategy),
            pattern,
            entry_point,
            stages,
            compile_strategy,
            route_locked: request.forced_pattern.is_some(),
            reason,
            signals: serde_json::to_value(&signal).unwrap_or(serde_json::Value::Null),
        }
    }

    fn plan_forced(
        &self,
        state: &ExecutionState,
        request: &PlanRequest,
        forced: &[StageId],
        compile_strategy: CompileStrategy,
    ) -> ExecutionPlan {
        let (derived_pattern, _, signal) = self.derive_route(state, request);
        let pattern = request.forced_pattern.unwrap_or(derived_pattern);

        // Normalize: dedupe, entry first, terminal stage last
        let mut stages: Vec<StageId> = Vec::new();
        for stage in forced {
            if !stages.contains(stage) {
                stages.push(*stage);
            }
        }

        let entry_point = if stages.contains(&pattern.entry_point()) {
            pattern.entry_point()
        } else {
            stages
                .iter()
                .copied()
                .find(|s| !s.is_terminal())
                .unwrap_or(pattern.entry_point())
        };

        stages.retain(|s| *s != entry_point && !s.is_terminal());
        stages.insert(0, entry_point);
        stages.push(StageId::Synthesizer);

        ExecutionPlan {
            routing_key: routing_key(pattern, entry_point, compile_strategy),
            pattern,
            entry_point,
            stages,
            compile_strategy,
            route_locked: true,
            reason: "caller-forced stage list (normalized)".to_string(),
            signals: serde_json::to_value(&signal).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Resolve the intent signal, falling back safely when it is malformed.
    fn derive_route(
        &self,
        state: &ExecutionState,
        request: &PlanRequest,
    ) -> (Pattern, String, IntentSignal) {
        match &request.signal {
            Some(raw) => match serde_json::from_value::<IntentSignal>(raw.clone()) {
                Ok(signal) => {
                    let pattern = pattern_for(signal.route);
                    (pattern, format!("caller signal routed to {pattern}"), signal)
                }
                Err(e) => {
                    let signal = IntentSignal {
                        route: RouteHint::FreeForm,
                        detail: None,
                    };
                    (
                        Pattern::Standard,
                        format!("malformed intent signal ({e}); degraded to standard route"),
                        signal,
                    )
                }
            },
            None => {
                let signal = self.classifier.classify(&state.query);
                let pattern = pattern_for(signal.route);
                (pattern, format!("classifier routed to {pattern}"), signal)
            }
        }
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

fn pattern_for(route: RouteHint) -> Pattern {
    match route {
        RouteHint::StructuredQuery => Pattern::DataQuery,
        RouteHint::FreeForm => Pattern::Standard,
    }
}

fn routing_key(pattern: Pattern, entry: StageId, strategy: CompileStrategy) -> String {
    format!("{pattern}:{entry}:{strategy}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn state(query: &str) -> ExecutionState {
        ExecutionState::new(Uuid::new_v4(), query)
    }

    #[test]
    fn test_structured_query_routes_to_data_query() {
        let planner = Planner::new();
        let plan = planner.plan(
            &state("show consents where consent_type starts with D"),
            &PlanRequest::default(),
        );
        assert_eq!(plan.pattern, Pattern::DataQuery);
        assert_eq!(plan.entry_point, StageId::DataQuery);
        assert_eq!(plan.stages, vec![StageId::DataQuery, StageId::Synthesizer]);
        assert!(!plan.route_locked);
    }

    #[test]
    fn test_free_form_routes_to_standard() {
        let planner = Planner::new();
        let plan = planner.plan(
            &state("what documents do I need for enrollment?"),
            &PlanRequest::default(),
        );
        assert_eq!(plan.pattern, Pattern::Standard);
        assert_eq!(plan.entry_point, StageId::Refiner);
    }

    #[test]
    fn test_plan_is_idempotent_for_unchanged_state() {
        let planner = Planner::new();
        let state = state("show consents where consent_type starts with D");
        let request = PlanRequest::default();

        let first = planner.plan(&state, &request);
        let second = planner.plan(&state, &request);
        assert_eq!(first.pattern, second.pattern);
        assert_eq!(first.entry_point, second.entry_point);
        assert_eq!(first.stages, second.stages);
        assert_eq!(first.routing_key, second.routing_key);
    }

    #[test]
    fn test_malformed_signal_degrades_to_standard() {
        let planner = Planner::new();
        let request = PlanRequest {
            signal: Some(serde_json::json!({"route": "warp_drive"})),
            ..Default::default()
        };
        let plan = planner.plan(&state("show consents where consent_type starts with D"), &request);
        assert_eq!(plan.pattern, Pattern::Standard);
        assert_eq!(plan.entry_point, StageId::Refiner);
        assert!(plan.reason.contains("degraded"));
    }

    #[test]
    fn test_forced_stage_list_is_normalized() {
        let planner = Planner::new();
        let request = PlanRequest {
            forced_stages: Some(vec![
                StageId::Critic,
                StageId::Refiner,
                StageId::Critic, // duplicate
            ]),
            forced_pattern: Some(Pattern::Standard),
            ..Default::default()
        };
        let plan = planner.plan(&state("anything"), &request);
        assert!(plan.route_locked);
        // Entry first, dedupe applied, terminal appended last
        assert_eq!(plan.stages[0], StageId::Refiner);
        assert_eq!(*plan.stages.last().unwrap(), StageId::Synthesizer);
        assert_eq!(
            plan.stages.iter().filter(|s| **s == StageId::Critic).count(),
            1
        );
    }

    #[test]
    fn test_pattern_is_never_an_open_value() {
        // Superset capability is expressed only via compile_strategy
        let planner = Planner::new();
        let plan = planner.plan(&state("hello"), &PlanRequest::default());
        assert!(matches!(plan.pattern, Pattern::Standard | Pattern::DataQuery));
        assert_eq!(plan.compile_strategy, CompileStrategy::Superset);

        let narrowed = planner.plan(
            &state("hello"),
            &PlanRequest {
                compile_strategy: Some(CompileStrategy::Default),
                ..Default::default()
            },
        );
        assert_eq!(narrowed.compile_strategy, CompileStrategy::Default);
        assert!(matches!(
            narrowed.pattern,
            Pattern::Standard | Pattern::DataQuery
        ));
    }
}
