//! Error taxonomy for the pipeline boundary.
//!
//! Internals use `anyhow` with context; anything that crosses a stage boundary
//! (capture -> upload, event -> analysis) is mapped onto `PipelineError` so the
//! caller can tell terminal outcomes from ones worth redelivering.
//!
//! "No face" and "source object gone" are not errors here: the trigger reports
//! them as `AnalysisOutcome::NoFace` and `AnalysisOutcome::MissingObject`.

use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed object key or request. Terminal.
    #[error("validation error: {0}")]
    Validation(String),

    /// Download, upload or store failure.
    #[error("transient I/O failure ({context}): {source:#}")]
    Transient {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("analysis exceeded its {budget_ms}ms budget")]
    Timeout { budget_ms: u64 },

    #[error("transaction still conflicting after {attempts} attempts")]
    TransactionConflict { attempts: u32 },

    /// Missing deployment assets or unusable settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    pub fn transient(context: impl Into<String>, source: anyhow::Error) -> Self {
        PipelineError::Transient {
            context: context.into(),
            source,
        }
    }

    /// Whether the event platform should redeliver the event that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Transient { .. }
                | PipelineError::Timeout { .. }
                | PipelineError::TransactionConflict { .. }
        )
    }

    /// Lift a store error, keeping a conflict exhaustion typed.
    pub fn from_store(context: impl Into<String>, err: anyhow::Error) -> Self {
        match err.downcast::<PipelineError>() {
            Ok(typed) => typed,
            Err(err) => PipelineError::transient(context, err),
        }
    }
}
