//! Historian stage: retrieves prior-interaction context.

use crate::interfaces::{CollectionStore, Filter, FilterOp, LanguageModel};
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::stages::{Stage, StageContext, StageId};
use crate::state::StateUpdate;
use std::sync::Arc;
use tracing::debug;

const HISTORY_COLLECTION: &str = "interaction_history";
const HISTORY_LIMIT: usize = 10;

pub struct HistorianStage {
    language_model: Arc<dyn LanguageModel>,
    store: Arc<dyn CollectionStore>,
}

impl HistorianStage {
    pub fn new(language_model: Arc<dyn LanguageModel>, store: Arc<dyn CollectionStore>) -> Self {
        Self {
            language_model,
            store,
        }
    }

    fn fail(message: impl Into<String>) -> OrchestrationError {
        OrchestrationError::StageExecutionFailed {
            stage: StageId::Historian,
            message: message.into(),
        }
    }
}

#[async_trait::async_trait]
impl Stage for HistorianStage {
    fn id(&self) -> StageId {
        StageId::Historian
    }

    async fn execute(&self, ctx: StageContext) -> OrchestrationResult<StateUpdate> {
        let filters = [Filter {
            field: "workflow_id".to_string(),
            op: FilterOp::Ne,
            value: serde_json::Value::String(ctx.workflow_id.to_string()),
        }];
        let history = self
            .store
            .get_collection(HISTORY_COLLECTION, &filters, 0, HISTORY_LIMIT)
            .await
            .map_err(|e| Self::fail(e.to_string()))?;

        debug!(
            workflow_id = %ctx.workflow_id,
            entries = history.len(),
            "Retrieved interaction history"
        );

        // Nothing to contextualize against is a normal outcome, not an error.
        if history.is_empty() {
            return Ok(StateUpdate {
                output: Some(serde_json::json!({
                    "context": serde_json::Value::Null,
                    "history_entries": 0,
                })),
                routing_reason: Some("no prior interactions".to_string()),
                ..Default::default()
            });
        }

        let prompt = format!(
            "Summarize what in these prior interactions is relevant to the query \
             '{}':\n\n{}",
            ctx.query,
            serde_json::Value::Array(history.clone())
        );
        let context = self
            .language_model
            .generate(&prompt)
            .await
            .map_err(|e| Self::fail(e.to_string()))?;

        Ok(StateUpdate {
            output: Some(serde_json::json!({
                "context": context.trim(),
                "history_entries": history.len(),
            })),
            routing_reason: Some("prior-interaction context".to_string()),
            ..Default::default()
        })
    }
}
