//! Stage registry mapping identifiers to implementations.
//!
//! Lookup failures surface at wiring time as structured errors instead of
//! string-match misses deep inside execution.

use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::stages::{Stage, StageId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct StageRegistry {
    stages: HashMap<StageId, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage under its own identifier. Re-registration replaces,
    /// which tests use to swap in doubles.
    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        let id = stage.id();
        info!(stage = %id, "📚 Registered pipeline stage");
        self.stages.insert(id, stage);
    }

    pub fn get(&self, id: StageId) -> OrchestrationResult<Arc<dyn Stage>> {
        self.stages.get(&id).cloned().ok_or_else(|| {
            OrchestrationError::ValidationFailed(format!("stage '{id}' is not registered"))
        })
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.stages.contains_key(&id)
    }

    pub fn registered(&self) -> Vec<StageId> {
        let mut ids: Vec<StageId> = self.stages.keys().copied().collect();
        ids.sort();
        ids
    }
}
