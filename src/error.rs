//! Crate-wide error type and result alias.
//!
//! Component-specific error enums (orchestration, resilience, events) convert
//! into `ScholarError` at the crate boundary so callers only ever match one
//! taxonomy.

/// Top-level error type for the Scholar execution core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScholarError {
    /// Request or constraint validation failed before any stage ran
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stage failed while executing
    #[error("Stage execution error in '{stage}': {message}")]
    StageExecution { stage: String, message: String },

    /// Graph compilation failed; fatal for the request
    #[error("Graph compilation error: {0}")]
    GraphCompilation(String),

    /// Event sink setup or delivery failure (never propagated into the
    /// request path; surfaces only when assembling sinks)
    #[error("Event error: {0}")]
    Event(String),

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<crate::events::SinkError> for ScholarError {
    fn from(err: crate::events::SinkError) -> Self {
        ScholarError::Event(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScholarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_errors_convert_to_event_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: ScholarError = crate::events::SinkError::from(io).into();
        assert!(matches!(err, ScholarError::Event(_)));
        assert!(err.to_string().contains("read-only"));
    }
}
