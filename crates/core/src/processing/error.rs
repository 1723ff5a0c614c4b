//! Error types for the processing module.

use thiserror::Error;

/// Errors that can occur while processing or writing a resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    /// The wire bytes could not be parsed into a resource.
    #[error("Failed to decode resource: {0}")]
    Decode(String),

    /// The resource could not be serialized.
    #[error("Failed to encode resource: {0}")]
    Encode(String),

    /// A processor tried to forward a resource before being wired into a pipeline.
    #[error("Processor output has not been set")]
    OutputNotSet,

    /// A processor or sink failed.
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },
}

impl ProcessingError {
    /// Creates a stage failure.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}
