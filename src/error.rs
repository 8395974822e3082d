//! Failure taxonomy for the retrieval-augmented pipeline.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the ingestion and query pipeline.
///
/// Ingestion-time errors are per-document and never abort a whole batch;
/// query-time errors propagate to the caller as structured results so the
/// boundary layer decides how to phrase them. The pipeline never converts a
/// failure into a fabricated answer.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad ingestion input (empty or unreadable document). The offending item
    /// is skipped; any existing entry for its source stays in place.
    #[error("document rejected: {0}")]
    Content(String),

    /// An embedding or generation backend was unavailable, rate limited, or
    /// returned an unusable response. Retried with bounded backoff at the
    /// point of use, then surfaced.
    #[error("provider request failed: {0}")]
    Provider(String),

    /// The index holds vectors produced by a different embedding model than
    /// the one used for the query. Fatal to that retrieval call.
    #[error("embedding model mismatch: index holds '{indexed}', query used '{requested}'")]
    ModelMismatch { indexed: String, requested: String },

    /// A bounded wait on a provider call elapsed. Distinct from a
    /// provider-reported failure so callers can decide whether to retry.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Unrecoverable failure from the answer composer's model call.
    #[error("generation failed: {0}")]
    Generation(String),

    /// SQLite storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(String),
}

impl PipelineError {
    /// Whether a retry at the point of use could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::Timeout(_))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<tokio_rusqlite::Error> for PipelineError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
