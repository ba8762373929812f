//! Property tests for the resource optimizer's selection invariants.

use proptest::prelude::*;
use scholar_core::orchestration::{
    OptimizationStrategy, ResourceConstraints, ResourceOptimizer,
};
use scholar_core::stages::StageId;
use std::collections::HashMap;

const STRATEGIES: [OptimizationStrategy; 6] = [
    OptimizationStrategy::PerformanceFirst,
    OptimizationStrategy::ReliabilityFirst,
    OptimizationStrategy::QualityFirst,
    OptimizationStrategy::Balanced,
    OptimizationStrategy::Minimal,
    OptimizationStrategy::CostFirst,
];

proptest! {
    /// For valid count bounds the selection always lands inside them,
    /// regardless of strategy or complexity.
    #[test]
    fn selection_count_stays_within_bounds(
        min_count in 1usize..=5,
        extra in 0usize..=4,
        complexity in 0.0f64..=1.0,
        strategy in prop::sample::select(STRATEGIES.to_vec()),
    ) {
        let max_count = (min_count + extra).min(StageId::ALL.len());
        let constraints = ResourceConstraints {
            min_count,
            max_count,
            ..Default::default()
        };

        let decision = ResourceOptimizer::new().select(
            &StageId::ALL,
            complexity,
            &HashMap::new(),
            &constraints,
            strategy,
        );

        prop_assert!(decision.selected_stages.len() >= min_count);
        prop_assert!(decision.selected_stages.len() <= max_count);
    }

    /// Forbidden stages never appear in the selection as long as a viable
    /// route remains.
    #[test]
    fn forbidden_stages_never_selected(
        forbid_mask in 0u8..16,
        complexity in 0.0f64..=1.0,
        strategy in prop::sample::select(STRATEGIES.to_vec()),
    ) {
        // The general-purpose entry stage stays permitted so the run never
        // collapses into the degenerate fallback path
        let forbiddable = [
            StageId::DataQuery,
            StageId::Critic,
            StageId::Historian,
            StageId::Synthesizer,
        ];
        let forbidden: std::collections::BTreeSet<StageId> = forbiddable
            .iter()
            .enumerate()
            .filter(|(i, _)| forbid_mask & (1 << i) != 0)
            .map(|(_, s)| *s)
            .collect();
        let constraints = ResourceConstraints {
            forbidden: forbidden.clone(),
            ..Default::default()
        };

        let decision = ResourceOptimizer::new().select(
            &StageId::ALL,
            complexity,
            &HashMap::new(),
            &constraints,
            strategy,
        );

        for stage in &decision.selected_stages {
            prop_assert!(!forbidden.contains(stage), "{stage} was forbidden");
        }
        prop_assert!(!decision.selected_stages.is_empty());
    }

    /// Confidence is always a probability, even for out-of-range complexity.
    #[test]
    fn confidence_stays_in_unit_range(
        complexity in -2.0f64..=3.0,
        strategy in prop::sample::select(STRATEGIES.to_vec()),
    ) {
        let decision = ResourceOptimizer::new().select(
            &StageId::ALL,
            complexity,
            &HashMap::new(),
            &ResourceConstraints::default(),
            strategy,
        );
        prop_assert!((0.0..=1.0).contains(&decision.confidence));
    }
}
