//! # Pipeline Stages
//!
//! The closed set of stage identifiers, the `Stage` execution trait, and the
//! registry that resolves identifiers to implementations.
//!
//! Stage dispatch is enum-keyed rather than string-keyed: an unknown stage is
//! a construction-time error, not a runtime string-match miss.

pub mod critic;
pub mod data_query;
pub mod historian;
pub mod refiner;
pub mod registry;
pub mod synthesizer;

pub use critic::CriticStage;
pub use data_query::DataQueryStage;
pub use historian::HistorianStage;
pub use refiner::RefinerStage;
pub use registry::StageRegistry;
pub use synthesizer::SynthesizerStage;

use crate::orchestration::errors::OrchestrationResult;
use crate::state::StateUpdate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Closed set of pipeline stage identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// General-purpose query refinement
    Refiner,
    /// Structured database-query fast path
    DataQuery,
    /// Reviews the refined query/answer draft
    Critic,
    /// Retrieves prior-interaction context
    Historian,
    /// Terminal best-effort answer synthesis
    Synthesizer,
}

impl StageId {
    /// Every stage, in canonical order.
    pub const ALL: [StageId; 5] = [
        StageId::Refiner,
        StageId::DataQuery,
        StageId::Critic,
        StageId::Historian,
        StageId::Synthesizer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Refiner => "refiner",
            StageId::DataQuery => "data_query",
            StageId::Critic => "critic",
            StageId::Historian => "historian",
            StageId::Synthesizer => "synthesizer",
        }
    }

    /// The terminal synthesis stage always runs last in any plan.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageId::Synthesizer)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "refiner" => Ok(StageId::Refiner),
            "data_query" => Ok(StageId::DataQuery),
            "critic" => Ok(StageId::Critic),
            "historian" => Ok(StageId::Historian),
            "synthesizer" => Ok(StageId::Synthesizer),
            other => Err(UnknownStage(other.to_string())),
        }
    }
}

/// Error for stage names outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown stage: '{0}'")]
pub struct UnknownStage(pub String);

/// Read-only snapshot of request state handed to a stage for execution.
///
/// Stages never receive the live [`crate::state::ExecutionState`]; they work
/// against this snapshot and return a [`StateUpdate`] that the stage wrapper
/// merges under lock.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub workflow_id: Uuid,
    /// Current working query (possibly refined by an upstream stage)
    pub query: String,
    /// Query exactly as the caller submitted it
    pub original_query: String,
    /// Outputs committed by upstream stages
    pub upstream_outputs: HashMap<StageId, serde_json::Value>,
    /// Structured outputs committed by upstream stages
    pub upstream_structured: HashMap<StageId, serde_json::Value>,
}

/// One named unit of work in the pipeline.
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Execute against a state snapshot, returning the partial update to merge.
    async fn execute(&self, ctx: StageContext) -> OrchestrationResult<StateUpdate>;
}
