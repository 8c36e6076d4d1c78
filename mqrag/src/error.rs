//! Error types for the `mqrag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while ingesting documents or answering a question.
///
/// A degraded query expansion is deliberately absent here: it is reported as
/// [`ExpansionOutcome::Degraded`](crate::expansion::ExpansionOutcome) and the
/// request carries on with the original question.
#[derive(Debug, Error)]
pub enum RagError {
    /// A source record could not be turned into a document.
    #[error("Ingestion error (record {record}): {message}")]
    Ingestion {
        /// Position or identifier of the offending record.
        record: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding index could not be reached or rejected the operation.
    #[error("Index unavailable ({backend}): {message}")]
    IndexUnavailable {
        /// The backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model failed or produced an unusable answer.
    #[error("Generation failure ({model}): {message}")]
    Generation {
        /// The model that produced the error.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// A prompt template is malformed or could not be rendered.
    #[error("Template error: {0}")]
    Template(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stage or the whole request ran past its deadline.
    #[error("Timeout: {stage} did not finish within {after:?}")]
    Timeout {
        /// The stage that timed out (`request` for the umbrella deadline).
        stage: String,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl RagError {
    /// Shorthand for an [`RagError::IndexUnavailable`] error.
    pub fn index(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IndexUnavailable { backend: backend.into(), message: message.into() }
    }

    /// Shorthand for an [`RagError::Generation`] error.
    pub fn generation(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation { model: model.into(), message: message.into() }
    }

    /// Whether this error came from the online query path's external services.
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self,
            Self::IndexUnavailable { .. }
                | Self::Embedding { .. }
                | Self::Generation { .. }
                | Self::Timeout { .. }
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
