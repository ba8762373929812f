//! Built-in event sinks: console, rotating NDJSON file, and an in-memory
//! ring buffer for tests and short-lived debugging.

pub mod console;
pub mod file;
pub mod memory;

pub use console::ConsoleSink;
pub use file::{FileSink, FileSinkStats};
pub use memory::MemorySink;
