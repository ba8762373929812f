//! Structured error taxonomy for the execution path.
//!
//! Validation errors abort a request before any stage runs; stage execution
//! errors (including timeouts) are recorded into state and tolerated where
//! downstream dependencies allow; circuit-open errors are distinguishable so
//! callers can tell "temporarily disabled" from "this call failed"; graph
//! compilation errors are fatal and never silently downgraded.

use crate::stages::StageId;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum OrchestrationError {
    /// Malformed request or constraints; reported synchronously, no stage ran
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A stage's collaborator or logic failed during execution
    #[error("Stage '{stage}' failed: {message}")]
    StageExecutionFailed { stage: StageId, message: String },

    /// The stage exceeded its request-scoped timeout budget
    #[error("Stage '{stage}' timed out after {timeout:?}")]
    StageTimeout { stage: StageId, timeout: Duration },

    /// The stage's circuit is open; the stage body was not invoked
    #[error("Circuit open for stage '{stage}', retry in {remaining_cooldown:?}")]
    CircuitOpen {
        stage: StageId,
        remaining_cooldown: Duration,
    },

    /// Declared upstream dependencies have not committed successfully
    #[error("Stage '{stage}' is missing dependencies: {missing:?}")]
    MissingDependencies {
        stage: StageId,
        missing: Vec<StageId>,
    },

    /// DAG construction failed; fatal for the request
    #[error("Graph compilation failed: {0}")]
    GraphCompilationFailed(String),

    /// Every stage failed; no best-effort answer could be produced
    #[error("Workflow produced no successful stages: {0}")]
    WorkflowFailed(String),
}

impl OrchestrationError {
    /// Stable kind tag recorded into the execution state's error list.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrationError::ValidationFailed(_) => "validation",
            OrchestrationError::StageExecutionFailed { .. } => "stage_execution",
            OrchestrationError::StageTimeout { .. } => "timeout",
            OrchestrationError::CircuitOpen { .. } => "circuit_open",
            OrchestrationError::MissingDependencies { .. } => "missing_dependency",
            OrchestrationError::GraphCompilationFailed(_) => "graph_compilation",
            OrchestrationError::WorkflowFailed(_) => "workflow_failed",
        }
    }

    /// Fatal errors abort the request; non-fatal ones are recorded and the
    /// walk continues under partial-failure tolerance.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestrationError::ValidationFailed(_)
                | OrchestrationError::GraphCompilationFailed(_)
                | OrchestrationError::WorkflowFailed(_)
        )
    }
}

impl From<OrchestrationError> for crate::error::ScholarError {
    fn from(err: OrchestrationError) -> Self {
        match &err {
            OrchestrationError::ValidationFailed(msg) => {
                crate::error::ScholarError::Validation(msg.clone())
            }
            OrchestrationError::GraphCompilationFailed(msg) => {
                crate::error::ScholarError::GraphCompilation(msg.clone())
            }
            OrchestrationError::StageExecutionFailed { stage, message } => {
                crate::error::ScholarError::StageExecution {
                    stage: stage.to_string(),
                    message: message.clone(),
                }
            }
            other => crate::error::ScholarError::StageExecution {
                stage: "workflow".to_string(),
                message: other.to_string(),
            },
        }
    }
}

pub type OrchestrationResult<T> = std::result::Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        let err = OrchestrationError::CircuitOpen {
            stage: StageId::Critic,
            remaining_cooldown: Duration::from_secs(120),
        };
        assert_eq!(err.kind(), "circuit_open");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_compilation_errors_are_fatal() {
        assert!(OrchestrationError::GraphCompilationFailed("cycle".into()).is_fatal());
        assert!(!OrchestrationError::StageTimeout {
            stage: StageId::Refiner,
            timeout: Duration::from_secs(1),
        }
        .is_fatal());
    }
}
