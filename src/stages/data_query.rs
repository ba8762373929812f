//! Structured database-query stage.
//!
//! Extracts a [`QuerySpec`] from the natural-language query through the
//! structured-output interface, then issues a narrow collection read. Schema
//! knowledge lives entirely on the collaborator side.

use crate::interfaces::{CollectionStore, LanguageModel, QuerySpec, StructuredOutput};
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::stages::{Stage, StageContext, StageId};
use crate::state::StateUpdate;
use std::sync::Arc;
use tracing::debug;

pub struct DataQueryStage {
    language_model: Arc<dyn LanguageModel>,
    store: Arc<dyn CollectionStore>,
}

impl DataQueryStage {
    pub fn new(language_model: Arc<dyn LanguageModel>, store: Arc<dyn CollectionStore>) -> Self {
        Self {
            language_model,
            store,
        }
    }

    fn fail(message: impl Into<String>) -> OrchestrationError {
        OrchestrationError::StageExecutionFailed {
            stage: StageId::DataQuery,
            message: message.into(),
        }
    }
}

#[async_trait::async_trait]
impl Stage for DataQueryStage {
    fn id(&self) -> StageId {
        StageId::DataQuery
    }

    async fn execute(&self, ctx: StageContext) -> OrchestrationResult<StateUpdate> {
        let prompt = format!(
            "Extract the collection read described by this request:\n\n{}",
            ctx.query
        );

        let spec = match self
            .language_model
            .generate_structured(&prompt, &QuerySpec::json_schema())
            .await
            .map_err(|e| Self::fail(e.to_string()))?
        {
            StructuredOutput::Typed(value) => serde_json::from_value::<QuerySpec>(value)
                .map_err(|e| Self::fail(format!("structured output did not match schema: {e}")))?,
            // Provider fell back to raw text; one parse attempt before failing
            StructuredOutput::RawText(text) => serde_json::from_str::<QuerySpec>(&text)
                .map_err(|e| Self::fail(format!("could not coerce raw text to a query spec: {e}")))?,
        };

        debug!(
            workflow_id = %ctx.workflow_id,
            collection = %spec.collection,
            filter_count = spec.filters.len(),
            "Executing collection read"
        );

        let rows = self
            .store
            .get_collection(&spec.collection, &spec.filters, spec.skip, spec.limit)
            .await
            .map_err(|e| Self::fail(e.to_string()))?;

        Ok(StateUpdate {
            output: Some(serde_json::json!({
                "collection": spec.collection,
                "row_count": rows.len(),
                "filters": spec.filters,
            })),
            structured_output: Some(serde_json::Value::Array(rows)),
            routing_reason: Some("structured data-query fast path".to_string()),
            ..Default::default()
        })
    }
}
