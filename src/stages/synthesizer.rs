//! Terminal synthesis stage.
//!
//! Deliberately dependency-free: it produces a best-effort answer from
//! whatever upstream outputs committed, which is what makes partial-failure
//! tolerance possible at the workflow level.

use crate::interfaces::LanguageModel;
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::stages::{Stage, StageContext, StageId};
use crate::state::StateUpdate;
use std::sync::Arc;
use tracing::debug;

pub struct SynthesizerStage {
    language_model: Arc<dyn LanguageModel>,
}

impl SynthesizerStage {
    pub fn new(language_model: Arc<dyn LanguageModel>) -> Self {
        Self { language_model }
    }
}

#[async_trait::async_trait]
impl Stage for SynthesizerStage {
    fn id(&self) -> StageId {
        StageId::Synthesizer
    }

    async fn execute(&self, ctx: StageContext) -> OrchestrationResult<StateUpdate> {
        let mut sections: Vec<String> = Vec::new();
        for stage in StageId::ALL {
            if stage == StageId::Synthesizer {
                continue;
            }
            if let Some(output) = ctx.upstream_outputs.get(&stage) {
                sections.push(format!("{stage}: {output}"));
            }
            if let Some(rows) = ctx.upstream_structured.get(&stage) {
                sections.push(format!("{stage} rows: {rows}"));
            }
        }

        debug!(
            workflow_id = %ctx.workflow_id,
            upstream_sections = sections.len(),
            "Synthesizing final answer"
        );

        let prompt = format!(
            "Answer the question '{}' using only the material below. If the \
             material is incomplete, answer what can be answered and say what is \
             missing.\n\n{}",
            ctx.original_query,
            sections.join("\n")
        );

        let answer = self
            .language_model
            .generate(&prompt)
            .await
            .map_err(|e| OrchestrationError::StageExecutionFailed {
                stage: StageId::Synthesizer,
                message: e.to_string(),
            })?;

        Ok(StateUpdate {
            output: Some(serde_json::json!({
                "final_answer": answer.trim(),
                "sources": sections.len(),
            })),
            routing_reason: Some("terminal synthesis".to_string()),
            ..Default::default()
        })
    }
}
