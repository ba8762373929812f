//! # Event System
//!
//! Structured observability events fanned out asynchronously to pluggable
//! sinks. Delivery is best-effort by contract: a failing sink is logged and
//! isolated, and the event path never propagates errors into request
//! handling.

pub mod emitter;
pub mod sinks;
pub mod types;

pub use emitter::{EventEmitter, EventFilter, EventSink, SinkError};
pub use sinks::{ConsoleSink, FileSink, FileSinkStats, MemorySink};
pub use types::{EventCategory, EventType, WorkflowEvent};
