//! Shared collaborator mocks for the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use scholar_core::interfaces::{
    CheckpointStore, CollectionStore, Filter, FilterOp, LanguageModel, StructuredOutput,
};
use scholar_core::state::StateSnapshot;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Deterministic language model. Plain generation always answers; structured
/// generation replays scripted outputs in order.
pub struct MockLanguageModel {
    pub generate_calls: AtomicUsize,
    hang_first: usize,
    hang_for: Duration,
    structured: Mutex<VecDeque<StructuredOutput>>,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self {
            generate_calls: AtomicUsize::new(0),
            hang_first: 0,
            hang_for: Duration::ZERO,
            structured: Mutex::new(VecDeque::new()),
        }
    }

    /// The first `n` plain-generation calls stall for `delay` before
    /// answering, which trips a shorter stage timeout.
    pub fn hanging_first(n: usize, delay: Duration) -> Self {
        Self {
            hang_first: n,
            hang_for: delay,
            ..Self::new()
        }
    }

    pub fn with_structured(self, value: serde_json::Value) -> Self {
        self.structured
            .lock()
            .push_back(StructuredOutput::Typed(value));
        self
    }

    pub fn with_structured_raw(self, text: &str) -> Self {
        self.structured
            .lock()
            .push_back(StructuredOutput::RawText(text.to_string()));
        self
    }
}

#[async_trait::async_trait]
impl LanguageModel for MockLanguageModel {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let call = self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.hang_first {
            tokio::time::sleep(self.hang_for).await;
        }
        let head: String = prompt.chars().take(60).collect();
        Ok(format!("mock answer for: {head}"))
    }

    async fn generate_structured(
        &self,
        _prompt: &str,
        _schema: &serde_json::Value,
    ) -> anyhow::Result<StructuredOutput> {
        Ok(self
            .structured
            .lock()
            .pop_front()
            .unwrap_or(StructuredOutput::RawText("{}".to_string())))
    }
}

/// In-memory collection store applying the filter operators over seeded rows.
pub struct MockCollectionStore {
    collections: HashMap<String, Vec<serde_json::Value>>,
    pub calls: AtomicUsize,
}

impl MockCollectionStore {
    pub fn new() -> Self {
        Self {
            collections: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_collection(mut self, name: &str, rows: Vec<serde_json::Value>) -> Self {
        self.collections.insert(name.to_string(), rows);
        self
    }

    /// Fixture data the scenario tests query against.
    pub fn seeded() -> Self {
        Self::new()
            .with_collection(
                "consents",
                vec![
                    serde_json::json!({"consent_type": "Data sharing", "granted": true}),
                    serde_json::json!({"consent_type": "Directory information", "granted": false}),
                    serde_json::json!({"consent_type": "Photo release", "granted": true}),
                ],
            )
            .with_collection(
                "interaction_history",
                vec![serde_json::json!({
                    "workflow_id": "00000000-0000-0000-0000-000000000000",
                    "query": "library opening hours",
                })],
            )
    }

    fn matches(row: &serde_json::Value, filter: &Filter) -> bool {
        let Some(value) = row.get(&filter.field) else {
            return false;
        };
        match filter.op {
            FilterOp::Eq => value == &filter.value,
            FilterOp::Ne => value != &filter.value,
            FilterOp::StartsWith => match (value.as_str(), filter.value.as_str()) {
                (Some(v), Some(f)) => v.starts_with(f),
                _ => false,
            },
            FilterOp::Contains => match (value.as_str(), filter.value.as_str()) {
                (Some(v), Some(f)) => v.contains(f),
                _ => false,
            },
            FilterOp::Gt => match (value.as_f64(), filter.value.as_f64()) {
                (Some(v), Some(f)) => v > f,
                _ => false,
            },
            FilterOp::Lt => match (value.as_f64(), filter.value.as_f64()) {
                (Some(v), Some(f)) => v < f,
                _ => false,
            },
        }
    }
}

#[async_trait::async_trait]
impl CollectionStore for MockCollectionStore {
    async fn get_collection(
        &self,
        name: &str,
        filters: &[Filter],
        skip: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<serde_json::Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rows = self.collections.get(name).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| filters.iter().all(|f| Self::matches(row, f)))
            .skip(skip)
            .take(limit)
            .collect())
    }
}

/// Checkpoint store that only counts and labels what it was asked to save.
#[derive(Default)]
pub struct MockCheckpointStore {
    pub saves: AtomicUsize,
    pub labels: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl CheckpointStore for MockCheckpointStore {
    async fn save(
        &self,
        _thread_id: &str,
        _state: &StateSnapshot,
        label: &str,
    ) -> anyhow::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.labels.lock().push(label.to_string());
        Ok(())
    }
}
