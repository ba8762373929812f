//! Injectable registry of per-stage circuit breakers.
//!
//! One registry per orchestrator instance; breakers are created lazily on
//! first use through the DashMap entry API so two concurrent requests racing
//! on the same stage share a single breaker.

use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
use crate::stages::StageId;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<StageId, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Get (or lazily create) the breaker guarding one stage function.
    pub fn breaker_for(&self, stage: StageId) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(stage)
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(stage.as_str().to_string(), self.config))
            })
            .clone()
    }

    /// Current state per stage, for health reporting.
    pub fn states(&self) -> Vec<(StageId, CircuitState)> {
        self.breakers
            .iter()
            .map(|entry| (*entry.key(), entry.value().state()))
            .collect()
    }

    /// Metrics snapshot for one stage, if its breaker has been created.
    pub async fn metrics_for(&self, stage: StageId) -> Option<CircuitBreakerMetrics> {
        let breaker = self.breakers.get(&stage).map(|e| e.value().clone())?;
        Some(breaker.metrics().await)
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
