//! # Resource Optimizer
//!
//! Scores the available stages against historical performance data and a
//! complexity estimate, then selects a subset under hard and soft constraints.
//! Every correction or violation along the way is surfaced as a structured
//! risk on the resulting [`RoutingDecision`]; never a silent failure and
//! never an exception.

use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::stages::StageId;
use crate::state::dependencies;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Historical performance entry for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StagePerformance {
    /// Fraction of past executions that succeeded, in [0,1]
    pub success_rate: f64,
    /// Average wall-clock latency in milliseconds
    pub avg_latency_ms: f64,
}

/// Validated optimization constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConstraints {
    pub min_count: usize,
    pub max_count: usize,
    pub required: BTreeSet<StageId>,
    pub forbidden: BTreeSet<StageId>,
    pub min_success_rate: f64,
    pub max_failure_rate: f64,
    pub max_total_time_ms: Option<f64>,
    pub max_cost: Option<f64>,
}

impl Default for ResourceConstraints {
    fn default() -> Self {
        Self {
            min_count: 1,
            max_count: StageId::ALL.len(),
            required: BTreeSet::new(),
            forbidden: BTreeSet::new(),
            min_success_rate: 0.0,
            max_failure_rate: 1.0,
            max_total_time_ms: None,
            max_cost: None,
        }
    }
}

impl ResourceConstraints {
    /// Check the constraint invariants, reporting violations as risks.
    pub fn validate(&self) -> Vec<Risk> {
        let mut risks = Vec::new();
        if self.min_count > self.max_count {
            risks.push(Risk::constraint(format!(
                "min_count {} exceeds max_count {}",
                self.min_count, self.max_count
            )));
        }
        if !self.required.is_disjoint(&self.forbidden) {
            risks.push(Risk::constraint(
                "required and forbidden stage sets overlap".to_string(),
            ));
        }
        if self.required.len() > self.max_count {
            risks.push(Risk::constraint(format!(
                "{} required stages exceed max_count {}",
                self.required.len(),
                self.max_count
            )));
        }
        if self.min_success_rate + self.max_failure_rate > 1.0 + f64::EPSILON
            && self.max_failure_rate < 1.0
        {
            risks.push(Risk::constraint(format!(
                "min_success_rate {} + max_failure_rate {} exceeds 1.0",
                self.min_success_rate, self.max_failure_rate
            )));
        }
        risks
    }
}

/// Kind of risk identified during optimization. Constraint violations weigh
/// heavier on confidence than data-quality corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    ConstraintViolation,
    DataQuality,
    Fallback,
}

/// One identified risk with an optional mitigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub kind: RiskKind,
    pub description: String,
    pub mitigation: Option<String>,
}

impl Risk {
    fn constraint(description: String) -> Self {
        Self {
            kind: RiskKind::ConstraintViolation,
            description,
            mitigation: None,
        }
    }

    fn data_quality(description: String, mitigation: &str) -> Self {
        Self {
            kind: RiskKind::DataQuality,
            description,
            mitigation: Some(mitigation.to_string()),
        }
    }
}

/// Categorical confidence derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s < 0.2 => ConfidenceLevel::VeryLow,
            s if s < 0.4 => ConfidenceLevel::Low,
            s if s < 0.6 => ConfidenceLevel::Moderate,
            s if s < 0.8 => ConfidenceLevel::High,
            _ => ConfidenceLevel::VeryHigh,
        }
    }
}

/// Structured reasoning behind a routing decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingReasoning {
    pub complexity_analysis: String,
    pub performance_analysis: String,
    pub resource_analysis: String,
    pub included: BTreeMap<StageId, String>,
    pub excluded: BTreeMap<StageId, String>,
}

/// Predicted execution characteristics of the selected combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePrediction {
    pub estimated_total_time_ms: f64,
    pub estimated_success_probability: f64,
    /// Stages with no data dependency on each other, runnable concurrently
    pub parallel_groups: Vec<Vec<StageId>>,
}

/// Output of one optimization call. Logged and emitted, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub selected_stages: Vec<StageId>,
    pub strategy: OptimizationStrategy,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub reasoning: RoutingReasoning,
    pub risks: Vec<Risk>,
    pub fallback_options: Vec<StageId>,
    pub prediction: PerformancePrediction,
}

/// Weight profiles applied per optimization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStrategy {
    PerformanceFirst,
    ReliabilityFirst,
    QualityFirst,
    Balanced,
    Minimal,
    CostFirst,
}

#[derive(Debug, Clone, Copy)]
struct ScoringWeights {
    time: f64,
    reliability: f64,
    quality: f64,
    context: f64,
}

impl OptimizationStrategy {
    fn weights(&self) -> ScoringWeights {
        match self {
            OptimizationStrategy::PerformanceFirst => ScoringWeights {
                time: 0.55,
                reliability: 0.20,
                quality: 0.15,
                context: 0.10,
            },
            OptimizationStrategy::ReliabilityFirst => ScoringWeights {
                time: 0.15,
                reliability: 0.55,
                quality: 0.20,
                context: 0.10,
            },
            OptimizationStrategy::QualityFirst => ScoringWeights {
                time: 0.10,
                reliability: 0.20,
                quality: 0.60,
                context: 0.10,
            },
            OptimizationStrategy::Balanced => ScoringWeights {
                time: 0.30,
                reliability: 0.30,
                quality: 0.30,
                context: 0.10,
            },
            OptimizationStrategy::Minimal => ScoringWeights {
                time: 0.40,
                reliability: 0.30,
                quality: 0.20,
                context: 0.10,
            },
            OptimizationStrategy::CostFirst => ScoringWeights {
                time: 0.60,
                reliability: 0.20,
                quality: 0.10,
                context: 0.10,
            },
        }
    }

    /// Minimum score for greedy inclusion beyond the required set.
    fn score_threshold(&self) -> f64 {
        match self {
            OptimizationStrategy::PerformanceFirst => 0.50,
            OptimizationStrategy::ReliabilityFirst => 0.50,
            OptimizationStrategy::QualityFirst => 0.45,
            OptimizationStrategy::Balanced => 0.45,
            OptimizationStrategy::Minimal => 0.70,
            OptimizationStrategy::CostFirst => 0.55,
        }
    }
}

/// Tunable coefficients. The confidence-penalty values shape qualitative
/// behavior (more risks, lower confidence; constraint violations heavier)
/// and are not load-bearing beyond that.
#[derive(Debug, Clone, Copy)]
pub struct OptimizerConfig {
    pub fast_latency_ms: f64,
    pub slow_latency_ms: f64,
    pub default_success_rate: f64,
    pub default_latency_ms: f64,
    pub constraint_risk_penalty: f64,
    pub data_risk_penalty: f64,
    pub multi_stage_bonus: f64,
    pub high_complexity_threshold: f64,
    pub complexity_quality_boost: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            fast_latency_ms: 500.0,
            slow_latency_ms: 5000.0,
            default_success_rate: 0.9,
            default_latency_ms: 1000.0,
            constraint_risk_penalty: 0.15,
            data_risk_penalty: 0.05,
            multi_stage_bonus: 0.05,
            high_complexity_threshold: 0.6,
            complexity_quality_boost: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScoredStage {
    stage: StageId,
    score: f64,
}

#[derive(Debug, Default)]
pub struct ResourceOptimizer {
    config: OptimizerConfig,
}

impl ResourceOptimizer {
    pub fn new() -> Self {
        Self {
            config: OptimizerConfig::default(),
        }
    }

    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Select a stage combination under the given constraints and strategy.
    pub fn select(
        &self,
        available: &[StageId],
        complexity: f64,
        performance: &HashMap<StageId, StagePerformance>,
        constraints: &ResourceConstraints,
        strategy: OptimizationStrategy,
    ) -> RoutingDecision {
        let mut risks: Vec<Risk> = Vec::new();

        // Empty availability is a degenerate, not an error.
        if available.is_empty() {
            risks.push(Risk::constraint("no stages available".to_string()));
            return self.decision(Vec::new(), &[], strategy, risks, complexity, constraints);
        }

        // Step 1: sanitize inputs, recording a risk per correction.
        let complexity = self.sanitize_complexity(complexity, &mut risks);
        let perf = self.sanitize_performance(available, performance, &mut risks);

        // Step 2: constraint invariants and hard filtering.
        risks.extend(constraints.validate());

        let all_required_forbidden = !constraints.required.is_empty()
            && constraints
                .required
                .iter()
                .all(|stage| constraints.forbidden.contains(stage));
        if all_required_forbidden {
            // Nothing sensible remains of the requested route; fall back to
            // the general-purpose stage at hard-capped confidence.
            risks.push(Risk {
                kind: RiskKind::ConstraintViolation,
                description: "all required/selected stages forbidden".to_string(),
                mitigation: Some("fall back to the general-purpose refiner stage".to_string()),
            });
            return self.fallback_decision(
                vec![StageId::Refiner],
                available,
                strategy,
                risks,
                complexity,
                constraints,
                &perf,
            );
        }

        let mut candidates: Vec<StageId> = available
            .iter()
            .copied()
            .filter(|stage| !constraints.forbidden.contains(stage))
            .collect();

        // Rate floors/ceilings, with required stages forced back in.
        candidates.retain(|stage| {
            let p = perf[stage];
            let passes = p.success_rate >= constraints.min_success_rate
                && (1.0 - p.success_rate) <= constraints.max_failure_rate;
            if !passes && constraints.required.contains(stage) {
                risks.push(Risk::constraint(format!(
                    "required stage '{stage}' violates success/failure rate constraints"
                )));
                return true;
            }
            passes
        });

        if candidates.is_empty() {
            risks.push(Risk::constraint(
                "constraint filtering removed every candidate stage".to_string(),
            ));
            return self.fallback_decision(
                vec![StageId::Refiner],
                available,
                strategy,
                risks,
                complexity,
                constraints,
                &perf,
            );
        }

        // Step 3: weighted scoring per strategy.
        let scored: Vec<ScoredStage> = candidates
            .iter()
            .map(|stage| ScoredStage {
                stage: *stage,
                score: self.score_stage(*stage, complexity, perf[stage], constraints, strategy),
            })
            .collect();

        // Step 4: combination selection; an internal failure degrades to the
        // first one-or-two candidates rather than propagating.
        let (selected, degraded) = match self.select_combination(&scored, constraints, strategy) {
            Ok(selected) => (selected, false),
            Err(e) => {
                warn!(error = %e, "Strategy execution failed - degrading to leading candidates");
                risks.push(Risk {
                    kind: RiskKind::Fallback,
                    description: format!("strategy execution failed: {e}"),
                    mitigation: Some("selected leading candidates at reduced confidence".into()),
                });
                (
                    scored.iter().take(2).map(|s| s.stage).collect(),
                    true,
                )
            }
        };

        // Steps 5-6: confidence, reasoning, predictions.
        let mut decision = self.build_decision(
            selected, &scored, available, strategy, risks, complexity, constraints, &perf,
        );
        if degraded {
            decision.confidence = (decision.confidence * 0.5).clamp(0.0, 1.0);
            decision.confidence_level = ConfidenceLevel::from_score(decision.confidence);
        }
        decision
    }

    fn sanitize_complexity(&self, complexity: f64, risks: &mut Vec<Risk>) -> f64 {
        if !(0.0..=1.0).contains(&complexity) || complexity.is_nan() {
            risks.push(Risk::data_quality(
                format!("complexity score {complexity} outside [0,1]"),
                "clamped into range",
            ));
            if complexity.is_nan() {
                return 0.5;
            }
            return complexity.clamp(0.0, 1.0);
        }
        complexity
    }

    fn sanitize_performance(
        &self,
        available: &[StageId],
        performance: &HashMap<StageId, StagePerformance>,
        risks: &mut Vec<Risk>,
    ) -> HashMap<StageId, StagePerformance> {
        let mut sanitized = HashMap::with_capacity(available.len());
        for stage in available {
            let entry = match performance.get(stage) {
                Some(p) => {
                    let mut p = *p;
                    if !(0.0..=1.0).contains(&p.success_rate) || p.success_rate.is_nan() {
                        risks.push(Risk::data_quality(
                            format!("invalid success rate for stage '{stage}'"),
                            "reset to default",
                        ));
                        p.success_rate = self.config.default_success_rate;
                    }
                    if p.avg_latency_ms <= 0.0 || p.avg_latency_ms.is_nan() {
                        risks.push(Risk::data_quality(
                            format!("invalid latency for stage '{stage}'"),
                            "reset to default",
                        ));
                        p.avg_latency_ms = self.config.default_latency_ms;
                    }
                    p
                }
                None => {
                    risks.push(Risk::data_quality(
                        format!("no performance history for stage '{stage}'"),
                        "assumed defaults",
                    ));
                    StagePerformance {
                        success_rate: self.config.default_success_rate,
                        avg_latency_ms: self.config.default_latency_ms,
                    }
                }
            };
            sanitized.insert(*stage, entry);
        }
        sanitized
    }

    fn score_stage(
        &self,
        stage: StageId,
        complexity: f64,
        perf: StagePerformance,
        constraints: &ResourceConstraints,
        strategy: OptimizationStrategy,
    ) -> f64 {
        let weights = strategy.weights();

        // Linear interpolation between fast and slow latency references
        let time_score = if perf.avg_latency_ms <= self.config.fast_latency_ms {
            1.0
        } else if perf.avg_latency_ms >= self.config.slow_latency_ms {
            0.0
        } else {
            (self.config.slow_latency_ms - perf.avg_latency_ms)
                / (self.config.slow_latency_ms - self.config.fast_latency_ms)
        };

        let reliability_score = perf.success_rate;

        let mut quality_score = base_quality(stage);
        if complexity >= self.config.high_complexity_threshold
            && matches!(stage, StageId::Critic | StageId::Historian)
        {
            quality_score = (quality_score + self.config.complexity_quality_boost).min(1.0);
        }

        let context_score = if constraints.required.contains(&stage) {
            1.0
        } else {
            0.0
        };

        let score = weights.time * time_score
            + weights.reliability * reliability_score
            + weights.quality * quality_score
            + weights.context * context_score;

        debug!(
            stage = %stage,
            score = score,
            time_score = time_score,
            reliability_score = reliability_score,
            quality_score = quality_score,
            "Scored candidate stage"
        );
        score
    }

    fn select_combination(
        &self,
        scored: &[ScoredStage],
        constraints: &ResourceConstraints,
        strategy: OptimizationStrategy,
    ) -> OrchestrationResult<Vec<StageId>> {
        if constraints.max_count == 0 {
            return Err(OrchestrationError::ValidationFailed(
                "max_count of zero leaves no room for any stage".to_string(),
            ));
        }

        let mut by_score: Vec<&ScoredStage> = scored.iter().collect();
        by_score.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Required stages first, in candidate order.
        let mut selected: Vec<StageId> = scored
            .iter()
            .filter(|s| constraints.required.contains(&s.stage))
            .map(|s| s.stage)
            .collect();

        // Greedy: add above-threshold stages until max_count.
        let threshold = strategy.score_threshold();
        for candidate in &by_score {
            if selected.len() >= constraints.max_count {
                break;
            }
            if candidate.score >= threshold && !selected.contains(&candidate.stage) {
                selected.push(candidate.stage);
            }
        }

        // Top up to min_count with the best remaining when thresholding
        // under-selected.
        for candidate in &by_score {
            if selected.len() >= constraints.min_count {
                break;
            }
            if !selected.contains(&candidate.stage) {
                selected.push(candidate.stage);
            }
        }

        selected.truncate(constraints.max_count);
        Ok(selected)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_decision(
        &self,
        selected: Vec<StageId>,
        scored: &[ScoredStage],
        available: &[StageId],
        strategy: OptimizationStrategy,
        risks: Vec<Risk>,
        complexity: f64,
        constraints: &ResourceConstraints,
        perf: &HashMap<StageId, StagePerformance>,
    ) -> RoutingDecision {
        // Step 5: mean selected score scaled by selection completeness, then
        // the risk penalty (constraint violations weigh heavier).
        let selected_scores: Vec<f64> = selected
            .iter()
            .filter_map(|stage| scored.iter().find(|s| s.stage == *stage))
            .map(|s| s.score)
            .collect();
        let mean_score = if selected_scores.is_empty() {
            0.0
        } else {
            selected_scores.iter().sum::<f64>() / selected_scores.len() as f64
        };
        let completeness = if available.is_empty() {
            0.0
        } else {
            selected.len() as f64 / available.len() as f64
        };
        let confidence =
            (mean_score * completeness.min(1.0) - self.risk_penalty(&risks)).clamp(0.0, 1.0);

        // Step 6: reasoning, parallelism, predictions.
        let mut reasoning = RoutingReasoning {
            complexity_analysis: format!(
                "complexity {complexity:.2} ({})",
                if complexity >= self.config.high_complexity_threshold {
                    "high - review/context stages boosted"
                } else {
                    "moderate or low"
                }
            ),
            performance_analysis: format!(
                "{} candidates scored with {:?} weights",
                scored.len(),
                strategy
            ),
            resource_analysis: format!(
                "selected {}/{} available stages (bounds {}..={})",
                selected.len(),
                available.len(),
                constraints.min_count,
                constraints.max_count
            ),
            ..Default::default()
        };
        for entry in scored {
            if selected.contains(&entry.stage) {
                reasoning.included.insert(
                    entry.stage,
                    format!("score {:.2} with {:?} strategy", entry.score, strategy),
                );
            } else {
                reasoning.excluded.insert(
                    entry.stage,
                    format!(
                        "score {:.2} below threshold {:.2} or capacity",
                        entry.score,
                        strategy.score_threshold()
                    ),
                );
            }
        }
        for stage in available {
            if constraints.forbidden.contains(stage) {
                reasoning
                    .excluded
                    .insert(*stage, "forbidden by constraints".to_string());
            }
        }

        let prediction = self.predict(&selected, perf);
        let fallback_options: Vec<StageId> = scored
            .iter()
            .filter(|s| !selected.contains(&s.stage))
            .map(|s| s.stage)
            .take(2)
            .collect();

        RoutingDecision {
            selected_stages: selected,
            strategy,
            confidence,
            confidence_level: ConfidenceLevel::from_score(confidence),
            reasoning,
            risks,
            fallback_options,
            prediction,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fallback_decision(
        &self,
        selected: Vec<StageId>,
        available: &[StageId],
        strategy: OptimizationStrategy,
        risks: Vec<Risk>,
        complexity: f64,
        constraints: &ResourceConstraints,
        perf: &HashMap<StageId, StagePerformance>,
    ) -> RoutingDecision {
        let mut decision =
            self.decision(selected, available, strategy, risks, complexity, constraints);
        decision.prediction = self.predict(&decision.selected_stages, perf);
        decision.confidence = decision.confidence.min(0.3);
        decision.confidence_level = ConfidenceLevel::from_score(decision.confidence);
        decision
    }

    /// Minimal decision used for degenerate paths (no scoring happened).
    fn decision(
        &self,
        selected: Vec<StageId>,
        available: &[StageId],
        strategy: OptimizationStrategy,
        risks: Vec<Risk>,
        complexity: f64,
        constraints: &ResourceConstraints,
    ) -> RoutingDecision {
        let confidence = if selected.is_empty() {
            0.05
        } else {
            (0.3 - self.risk_penalty(&risks)).clamp(0.05, 0.3)
        };
        RoutingDecision {
            prediction: PerformancePrediction {
                estimated_total_time_ms: 0.0,
                estimated_success_probability: 0.0,
                parallel_groups: Vec::new(),
            },
            reasoning: RoutingReasoning {
                complexity_analysis: format!("complexity {complexity:.2}"),
                performance_analysis: "degenerate selection path".to_string(),
                resource_analysis: format!(
                    "{} available, bounds {}..={}",
                    available.len(),
                    constraints.min_count,
                    constraints.max_count
                ),
                ..Default::default()
            },
            confidence_level: ConfidenceLevel::from_score(confidence),
            confidence,
            selected_stages: selected,
            strategy,
            risks,
            fallback_options: Vec::new(),
        }
    }

    fn risk_penalty(&self, risks: &[Risk]) -> f64 {
        let constraint_risks = risks
            .iter()
            .filter(|r| r.kind == RiskKind::ConstraintViolation)
            .count() as f64;
        let data_risks = risks
            .iter()
            .filter(|r| r.kind != RiskKind::ConstraintViolation)
            .count() as f64;
        constraint_risks * self.config.constraint_risk_penalty
            + data_risks * self.config.data_risk_penalty
    }

    fn predict(
        &self,
        selected: &[StageId],
        perf: &HashMap<StageId, StagePerformance>,
    ) -> PerformancePrediction {
        let parallel_groups = dependencies::parallel_groups(selected);

        let total_latency: f64 = selected
            .iter()
            .map(|s| perf.get(s).map(|p| p.avg_latency_ms).unwrap_or(0.0))
            .sum();
        // Perfect-overlap model: a parallel group costs its slowest member
        let savings: f64 = parallel_groups
            .iter()
            .filter(|group| group.len() > 1)
            .map(|group| {
                let latencies: Vec<f64> = group
                    .iter()
                    .map(|s| perf.get(s).map(|p| p.avg_latency_ms).unwrap_or(0.0))
                    .collect();
                let sum: f64 = latencies.iter().sum();
                let max = latencies.iter().cloned().fold(0.0, f64::max);
                sum - max
            })
            .sum();

        let mut success_probability: f64 = selected
            .iter()
            .map(|s| perf.get(s).map(|p| p.success_rate).unwrap_or(1.0))
            .product();
        if selected.len() > 1 {
            // Small optimism bonus: multi-stage routes recover partial failures
            success_probability = (success_probability * (1.0 + self.config.multi_stage_bonus)).min(1.0);
        }

        PerformancePrediction {
            estimated_total_time_ms: (total_latency - savings).max(0.0),
            estimated_success_probability: success_probability,
            parallel_groups,
        }
    }
}

fn base_quality(stage: StageId) -> f64 {
    match stage {
        StageId::Refiner => 0.75,
        StageId::DataQuery => 0.85,
        StageId::Critic => 0.80,
        StageId::Historian => 0.70,
        StageId::Synthesizer => 0.90,
    }
}
