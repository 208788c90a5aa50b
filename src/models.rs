//! Core data models used throughout the retrieval pipeline.
//!
//! These types represent the chunk records persisted by the store, the
//! reports returned by ingestion, and the results returned by retrieval.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Derive the stable document id for a source locator.
///
/// Same locator, same id: the id is the URL-safe base64 encoding of the
/// locator bytes, so it can also be decoded back for diagnostics.
pub fn document_id_for(locator: &str) -> String {
    URL_SAFE_NO_PAD.encode(locator.as_bytes())
}

/// Build the unique chunk id from its document id and position.
pub fn chunk_id_for(document_id: &str, chunk_index: i64) -> String {
    format!("{}_{}", document_id, chunk_index)
}

/// Hex SHA-256 of a text, used for staleness detection.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A raw document handed to the extraction collaborator.
#[derive(Debug, Clone)]
pub struct DocumentBlob {
    /// Source locator (URL, blob key, or path). Determines the document id.
    pub locator: String,
    /// Display name of the source file.
    pub file_name: String,
    /// MIME type used to select the extractor.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Per-chunk metadata persisted alongside the text and embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_name: String,
    pub source_locator: String,
    pub position: i64,
    pub char_length: usize,
    pub token_estimate: usize,
    /// SHA-256 of this chunk's text.
    pub text_hash: String,
    /// SHA-256 of the whole normalized document the chunk was cut from.
    pub content_hash: String,
    /// Document-level summary; set on the lowest-index stored chunk only (chunk 0 unless it failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A persisted, embedded chunk. Immutable once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub collection_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
    pub created_at: DateTime<Utc>,
}

/// One chunk that could not be embedded or stored during ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkFailure {
    pub chunk_index: i64,
    /// `"embed"` or `"store"`.
    pub stage: &'static str,
    pub error: String,
    /// Leading part of malformed backend output, when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_sample: Option<String>,
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub source_locator: String,
    pub file_name: String,
    pub collection_id: String,
    pub total_chunks: usize,
    pub successful_chunks: usize,
    pub failed_chunks: usize,
    /// Chunks never attempted because the ingestion was cancelled.
    pub skipped_chunks: usize,
    pub failures: Vec<ChunkFailure>,
    /// True when stored chunks already matched the document and nothing was re-embedded.
    pub unchanged: bool,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A chunk selected by retrieval, with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub file_name: String,
    pub score: f32,
    pub text: String,
}

/// A document that contributed to an assembled context, for citation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDocument {
    pub document_id: String,
    pub file_name: String,
    pub source_locator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Output of the query path: the context handed to the chat completion.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub context: String,
    pub source_documents: Vec<SourceDocument>,
    /// Ranked chunks behind the context (empty on the overview path).
    pub matches: Vec<ScoredChunk>,
    /// True when the overview fast path answered with stored summaries.
    pub overview: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_deterministic() {
        let a = document_id_for("s3://bucket/handbook.pdf");
        let b = document_id_for("s3://bucket/handbook.pdf");
        let c = document_id_for("s3://bucket/other.pdf");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn document_id_is_url_safe() {
        let id = document_id_for("https://example.com/a?b=c&d=~~~");
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn chunk_id_combines_document_and_index() {
        assert_eq!(chunk_id_for("abc", 4), "abc_4");
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = hash_text("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_text("hello"));
    }
}
