//! # Execution State
//!
//! The single shared, mutable record accumulated across all stages of one
//! request, plus the static stage dependency table that gates execution order.

pub mod dependencies;
pub mod execution_state;

pub use dependencies::{dependencies, parallel_groups, validate, DependencyCheck};
pub use execution_state::{
    ExecutionErrorRecord, ExecutionState, StageMetadata, StateConfig, StateSnapshot, StateUpdate,
};
