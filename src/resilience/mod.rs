//! # Resilience Module
//!
//! Fault isolation for stage execution. Each stage function is protected by a
//! circuit breaker that fails fast after repeated failures until a cooldown
//! elapses, so a broken collaborator is not hammered by every request.
//!
//! Breaker state is process-wide *per stage function*, not per request, and
//! lives in an injectable [`CircuitBreakerRegistry`] owned by the orchestrator
//! instance rather than a process-global singleton, so parallel orchestrators
//! (e.g. in tests) cannot cross-contaminate.

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics, CircuitState,
};
pub use registry::CircuitBreakerRegistry;
