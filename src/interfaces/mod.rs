//! # External Collaborator Interfaces
//!
//! Narrow contracts through which the execution core consumes the outside
//! world: text generation, relational reads, and best-effort checkpointing.
//! The core treats every collaborator as a black box with a bounded call-time
//! budget; schema and prompt knowledge never live here.

use crate::state::StateSnapshot;
use serde::{Deserialize, Serialize};

/// Predicate operators supported by the collection-store read interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    StartsWith,
    Contains,
    Gt,
    Lt,
}

/// One field predicate applied server-side by the collection store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: serde_json::Value,
}

/// A structured read request extracted from a natural-language query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub collection: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "QuerySpec::default_limit")]
    pub limit: usize,
}

impl QuerySpec {
    fn default_limit() -> usize {
        50
    }

    /// JSON schema handed to the structured-output interface.
    pub fn json_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["collection"],
            "properties": {
                "collection": {"type": "string"},
                "filters": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["field", "op", "value"],
                        "properties": {
                            "field": {"type": "string"},
                            "op": {"enum": ["eq", "ne", "starts_with", "contains", "gt", "lt"]},
                            "value": {}
                        }
                    }
                },
                "skip": {"type": "integer", "minimum": 0},
                "limit": {"type": "integer", "minimum": 1}
            }
        })
    }
}

/// Outcome of a structured-generation call: either a typed value matching the
/// requested schema, or the provider's raw text when coercion failed.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutput {
    Typed(serde_json::Value),
    RawText(String),
}

/// External text-generation collaborator.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;

    /// Generate output conforming to `schema`, falling back to raw text when
    /// the provider cannot coerce.
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> anyhow::Result<StructuredOutput>;
}

/// External relational collaborator. The core never embeds schema knowledge;
/// it only issues narrow collection reads.
#[async_trait::async_trait]
pub trait CollectionStore: Send + Sync {
    async fn get_collection(
        &self,
        name: &str,
        filters: &[Filter],
        skip: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<serde_json::Value>>;
}

/// Optional checkpoint collaborator. Absence never blocks execution;
/// checkpointing is best-effort.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(
        &self,
        thread_id: &str,
        state: &StateSnapshot,
        label: &str,
    ) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_spec_deserializes_with_defaults() {
        let spec: QuerySpec =
            serde_json::from_value(serde_json::json!({"collection": "consents"})).unwrap();
        assert_eq!(spec.collection, "consents");
        assert!(spec.filters.is_empty());
        assert_eq!(spec.skip, 0);
        assert_eq!(spec.limit, 50);
    }

    #[test]
    fn test_filter_op_wire_names() {
        let op: FilterOp = serde_json::from_str("\"starts_with\"").unwrap();
        assert_eq!(op, FilterOp::StartsWith);
    }
}
