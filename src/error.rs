//! Error handling for the sensor pipeline
//!
//! This module defines custom error types and a Result alias for use
//! throughout the crate.

use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Errors related to configuration values (unrecognized rate mode, bad file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to the constrained buffer query language
    #[error("Predicate error: {0}")]
    Predicate(String),

    /// Errors reported by the upstream transmit sink
    #[error("Transmit error: {0}")]
    Transmit(#[from] crate::transmit::TransmitError),

    /// Errors raised by a data consumer during fan-out
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// A data type tag that does not match the value's payload representation
    #[error("Type mismatch: {requested:?} cannot represent a {actual:?} payload")]
    TypeMismatch {
        requested: crate::types::DataType,
        actual: crate::types::DataType,
    },

    /// Errors related to scheduled task execution
    #[error("Task error: {0}")]
    Task(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
