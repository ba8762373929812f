//! Critic stage: reviews the refiner's output before synthesis.

use crate::interfaces::LanguageModel;
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::stages::{Stage, StageContext, StageId};
use crate::state::StateUpdate;
use std::sync::Arc;

pub struct CriticStage {
    language_model: Arc<dyn LanguageModel>,
}

impl CriticStage {
    pub fn new(language_model: Arc<dyn LanguageModel>) -> Self {
        Self { language_model }
    }
}

#[async_trait::async_trait]
impl Stage for CriticStage {
    fn id(&self) -> StageId {
        StageId::Critic
    }

    async fn execute(&self, ctx: StageContext) -> OrchestrationResult<StateUpdate> {
        // The wrapper validated the refiner dependency before invoking us.
        let refined = ctx
            .upstream_outputs
            .get(&StageId::Refiner)
            .and_then(|v| v.get("refined_query"))
            .and_then(|v| v.as_str())
            .unwrap_or(&ctx.query)
            .to_string();

        let prompt = format!(
            "Review this refined school-information query for ambiguity or missing \
             constraints and list any concerns:\n\n{refined}"
        );

        let critique = self
            .language_model
            .generate(&prompt)
            .await
            .map_err(|e| OrchestrationError::StageExecutionFailed {
                stage: StageId::Critic,
                message: e.to_string(),
            })?;

        Ok(StateUpdate {
            output: Some(serde_json::json!({
                "critique": critique.trim(),
                "reviewed_query": refined,
            })),
            routing_reason: Some("review of refined query".to_string()),
            ..Default::default()
        })
    }
}
