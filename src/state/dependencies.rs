//! Static stage dependency table.
//!
//! Single source of truth for both pre-execution validation (the stage
//! wrapper refuses to run a stage whose upstream outputs are missing) and for
//! graph-edge construction in the compiler. The table is configuration, not
//! derived at runtime.

use crate::stages::StageId;
use crate::state::ExecutionState;

/// Declared upstream dependencies for a stage.
///
/// The critic and historian both review/extend the refiner's work and so
/// require its output. The synthesizer is deliberately dependency-free: it
/// produces a best-effort answer from whatever upstream outputs committed.
pub fn dependencies(stage: StageId) -> &'static [StageId] {
    match stage {
        StageId::Refiner => &[],
        StageId::DataQuery => &[],
        StageId::Critic => &[StageId::Refiner],
        StageId::Historian => &[StageId::Refiner],
        StageId::Synthesizer => &[],
    }
}

/// Result of a dependency check for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCheck {
    pub satisfied: bool,
    pub missing: Vec<StageId>,
}

/// Check whether `stage` may execute against the current state: every
/// declared dependency must have committed its merge as a success.
pub fn validate(state: &ExecutionState, stage: StageId) -> DependencyCheck {
    let missing: Vec<StageId> = dependencies(stage)
        .iter()
        .copied()
        .filter(|dep| !state.has_succeeded(*dep))
        .collect();
    DependencyCheck {
        satisfied: missing.is_empty(),
        missing,
    }
}

/// Partition an ordered stage list into dependency levels.
///
/// Stages within one level have no data dependency on each other (restricted
/// to the given list) and may run concurrently; each level joins before the
/// next starts. The terminal synthesizer, though dependency-free, is always
/// placed in a final level of its own.
pub fn parallel_groups(stages: &[StageId]) -> Vec<Vec<StageId>> {
    let mut groups: Vec<Vec<StageId>> = Vec::new();
    let mut placed: Vec<StageId> = Vec::new();
    let mut remaining: Vec<StageId> = stages
        .iter()
        .copied()
        .filter(|s| !s.is_terminal())
        .collect();

    while !remaining.is_empty() {
        let ready: Vec<StageId> = remaining
            .iter()
            .copied()
            .filter(|stage| {
                dependencies(*stage)
                    .iter()
                    .all(|dep| placed.contains(dep) || !stages.contains(dep))
            })
            .collect();

        // The static table is acyclic, so a stall can only mean the caller
        // passed a list we cannot order; stop rather than loop forever.
        if ready.is_empty() {
            groups.push(remaining.clone());
            break;
        }

        remaining.retain(|stage| !ready.contains(stage));
        placed.extend(ready.iter().copied());
        groups.push(ready);
    }

    if stages.iter().any(|s| s.is_terminal()) {
        groups.push(vec![StageId::Synthesizer]);
    }

    groups
}
