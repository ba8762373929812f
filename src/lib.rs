//! # Scholar Core
//!
//! Execution core for the Scholar school-information assistant: a query comes
//! in as natural language and leaves as a best-effort answer, driven through a
//! compiled DAG of pipeline stages.
//!
//! ## Architecture
//!
//! - **Planner** ([`orchestration::planner`]): routes each request onto one of
//!   two canonical execution patterns and produces an ordered stage list
//! - **Graph compiler** ([`orchestration::compiler`]): turns a plan into an
//!   executable DAG, cached per plan shape with single-winner compilation
//! - **Stage wrapper** ([`orchestration::stage_wrapper`]): dependency checks,
//!   a timeout budget, and a per-stage circuit breaker around every stage call
//! - **Resource optimizer** ([`orchestration::optimizer`]): constraint-aware
//!   stage selection with structured reasoning and risk reporting
//! - **Orchestrator** ([`orchestration::orchestrator`]): the top-level driver,
//!   walking the graph level by level with parallel stage execution
//! - **Events** ([`events`]): async fan-out of lifecycle events to pluggable
//!   sinks with per-sink fault isolation
//!
//! ## Usage
//!
//! ```no_run
//! use scholar_core::config::ScholarConfig;
//! use scholar_core::events::EventEmitter;
//! use scholar_core::orchestration::{Orchestrator, RequestConfig};
//! use scholar_core::stages::StageRegistry;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = StageRegistry::new(); // register stage implementations here
//! let orchestrator = Orchestrator::new(
//!     ScholarConfig::from_env()?,
//!     Arc::new(registry),
//!     Arc::new(EventEmitter::new()),
//! );
//! let result = orchestrator
//!     .execute("what documents do I need for enrollment?", RequestConfig::default())
//!     .await?;
//! println!("{:?}", result.answer);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod interfaces;
pub mod logging;
pub mod orchestration;
pub mod resilience;
pub mod stages;
pub mod state;

pub use config::ScholarConfig;
pub use error::{Result, ScholarError};
pub use orchestration::{Orchestrator, RequestConfig, WorkflowResult};
pub use stages::{Stage, StageContext, StageId, StageRegistry};
pub use state::{ExecutionState, StateSnapshot, StateUpdate};
