//! Error taxonomy for the retrieval pipeline.
//!
//! Each collaborator has its own error enum ([`ExtractError`],
//! [`EmbeddingError`], [`StoreError`]); the orchestrator wraps them in
//! [`RetrievalError`] together with the whole-operation failures
//! (no content, no chunks, nothing indexed).
//!
//! Per-chunk failures during ingestion never surface here directly: they
//! are counted in the [`IngestReport`](crate::models::IngestReport).

use std::time::Duration;

use thiserror::Error;

use crate::models::IngestReport;

/// Maximum number of characters of raw backend output kept in log lines.
const RAW_SAMPLE_CHARS: usize = 200;

/// Failure of the text-extraction collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedFormat(String),
    #[error("corrupt input: {0}")]
    CorruptInput(String),
}

/// Failure of an embedding backend.
#[derive(Debug, Error, Clone)]
pub enum EmbeddingError {
    /// The backend answered, but its output is not a valid vector.
    #[error("embedding output is not a valid {dims}-dimensional vector: {reason}")]
    Format {
        dims: usize,
        reason: String,
        raw: String,
    },
    #[error("embedding backend error: {0}")]
    Backend(String),
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
}

impl EmbeddingError {
    /// Leading part of the offending backend output, for diagnostics.
    pub fn raw_sample(&self) -> Option<String> {
        match self {
            EmbeddingError::Format { raw, .. } => Some(truncate_chars(raw, RAW_SAMPLE_CHARS)),
            _ => None,
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, EmbeddingError::Format { .. })
    }
}

/// Failure of the durable chunk store.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("dimension mismatch: store holds {expected}-dimensional embeddings, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("corrupt chunk record {chunk_id}: {reason}")]
    Corrupt { chunk_id: String, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Whole-operation failure of ingestion or retrieval.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("could not extract text from {locator}: {source}")]
    Extraction {
        locator: String,
        #[source]
        source: ExtractError,
    },
    #[error("no content to index in {locator}")]
    NoContent { locator: String },
    #[error("collection '{collection_id}' has no indexed chunks")]
    NoChunks { collection_id: String },
    #[error("no chunk in collection '{collection_id}' could be ranked against the query")]
    NoMatches { collection_id: String },
    #[error("blob not found: {0}")]
    BlobNotFound(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no chunk of {locator} could be indexed ({failed} of {total} failed; first error: {first_error})")]
    IngestionFailed {
        locator: String,
        total: usize,
        failed: usize,
        first_error: String,
    },
    #[error("ingestion of {} was cancelled before any chunk was stored", .0.source_locator)]
    Cancelled(Box<IngestReport>),
}

impl RetrievalError {
    /// True for conditions caused by the request itself (4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RetrievalError::Extraction { .. }
                | RetrievalError::NoContent { .. }
                | RetrievalError::NoChunks { .. }
                | RetrievalError::NoMatches { .. }
                | RetrievalError::BlobNotFound(_)
        )
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_sample_is_truncated() {
        let err = EmbeddingError::Format {
            dims: 3,
            reason: "not an array".to_string(),
            raw: "x".repeat(500),
        };
        let sample = err.raw_sample().unwrap();
        assert_eq!(sample.len(), RAW_SAMPLE_CHARS + 3);
        assert!(sample.ends_with("..."));
    }

    #[test]
    fn raw_sample_absent_for_backend_errors() {
        assert!(EmbeddingError::Backend("503".into()).raw_sample().is_none());
    }

    #[test]
    fn client_errors_are_classified() {
        let no_chunks = RetrievalError::NoChunks {
            collection_id: "agent-1".into(),
        };
        assert!(no_chunks.is_client_error());
        let store = RetrievalError::Store(StoreError::Unavailable("down".into()));
        assert!(!store.is_client_error());
    }
}
