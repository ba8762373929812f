//! Environment-aware crate configuration.
//!
//! Mirrors the operational defaults in [`crate::constants::system`] and lets
//! deployments override them through `SCHOLAR_*` environment variables.

use crate::constants::system;
use crate::error::{Result, ScholarError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ScholarConfig {
    /// Per-stage execution timeout budget
    pub stage_timeout: Duration,
    /// Consecutive failures before a stage's circuit opens
    pub circuit_failure_threshold: u32,
    /// Cooldown before an open circuit allows a probe call
    pub circuit_cooldown: Duration,
    /// Ring buffer capacity for the in-memory event sink
    pub memory_sink_capacity: usize,
    /// File sink rotation threshold in bytes
    pub file_sink_max_bytes: u64,
    /// Whether compiled graphs are cached between requests
    pub graph_cache_enabled: bool,
    /// Whether pre/post execution checkpoints are attempted
    pub checkpoints_enabled: bool,
}

impl Default for ScholarConfig {
    fn default() -> Self {
        Self {
            stage_timeout: system::STAGE_TIMEOUT,
            circuit_failure_threshold: system::CIRCUIT_FAILURE_THRESHOLD,
            circuit_cooldown: system::CIRCUIT_COOLDOWN,
            memory_sink_capacity: system::MEMORY_SINK_CAPACITY,
            file_sink_max_bytes: system::FILE_SINK_MAX_BYTES,
            graph_cache_enabled: true,
            checkpoints_enabled: true,
        }
    }
}

impl ScholarConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(timeout) = std::env::var("SCHOLAR_STAGE_TIMEOUT_SECS") {
            let secs: u64 = timeout.parse().map_err(|e| {
                ScholarError::Configuration(format!("Invalid stage timeout: {e}"))
            })?;
            config.stage_timeout = Duration::from_secs(secs);
        }

        if let Ok(threshold) = std::env::var("SCHOLAR_CIRCUIT_FAILURE_THRESHOLD") {
            config.circuit_failure_threshold = threshold.parse().map_err(|e| {
                ScholarError::Configuration(format!("Invalid circuit failure threshold: {e}"))
            })?;
        }

        if let Ok(cooldown) = std::env::var("SCHOLAR_CIRCUIT_COOLDOWN_SECS") {
            let secs: u64 = cooldown.parse().map_err(|e| {
                ScholarError::Configuration(format!("Invalid circuit cooldown: {e}"))
            })?;
            config.circuit_cooldown = Duration::from_secs(secs);
        }

        if let Ok(cache) = std::env::var("SCHOLAR_GRAPH_CACHE_ENABLED") {
            config.graph_cache_enabled = cache.parse().map_err(|e| {
                ScholarError::Configuration(format!("Invalid graph cache flag: {e}"))
            })?;
        }

        Ok(config)
    }

    /// Configuration tuned for fast tests: short timeouts and cooldowns.
    pub fn for_testing() -> Self {
        Self {
            stage_timeout: Duration::from_millis(500),
            circuit_cooldown: Duration::from_millis(100),
            memory_sink_capacity: 32,
            ..Self::default()
        }
    }
}
