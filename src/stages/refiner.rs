//! General-purpose query refinement stage.

use crate::interfaces::LanguageModel;
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::stages::{Stage, StageContext, StageId};
use crate::state::StateUpdate;
use std::sync::Arc;
use tracing::debug;

/// Rewrites the caller's free-form question into a focused query that the
/// downstream stages work against.
pub struct RefinerStage {
    language_model: Arc<dyn LanguageModel>,
}

impl RefinerStage {
    pub fn new(language_model: Arc<dyn LanguageModel>) -> Self {
        Self { language_model }
    }
}

#[async_trait::async_trait]
impl Stage for RefinerStage {
    fn id(&self) -> StageId {
        StageId::Refiner
    }

    async fn execute(&self, ctx: StageContext) -> OrchestrationResult<StateUpdate> {
        let prompt = format!(
            "Rewrite this school-information question as a single focused query, \
             keeping every constraint the user stated:\n\n{}",
            ctx.query
        );

        let refined = self
            .language_model
            .generate(&prompt)
            .await
            .map_err(|e| OrchestrationError::StageExecutionFailed {
                stage: StageId::Refiner,
                message: e.to_string(),
            })?;
        let refined = refined.trim().to_string();

        debug!(workflow_id = %ctx.workflow_id, refined = %refined, "Query refined");

        Ok(StateUpdate {
            output: Some(serde_json::json!({
                "refined_query": refined,
                "original_query": ctx.original_query,
            })),
            query: Some(refined),
            routing_reason: Some("general-purpose refinement".to_string()),
            ..Default::default()
        })
    }
}
