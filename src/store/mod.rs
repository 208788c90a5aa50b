//! Chunk storage abstraction.
//!
//! The [`ChunkStore`] trait is everything the orchestrator needs from the
//! durable store: upsert by `(document_id, chunk_index)`, lookup by document
//! and by collection, and bulk deletion. Two backends implement it:
//!
//! - [`SqliteChunkStore`]: the durable store used by the CLI.
//! - [`InMemoryChunkStore`]: for tests and ephemeral runs.
//!
//! A store holds embeddings of exactly one dimensionality, fixed when it is
//! created. Writing a vector of any other length fails with
//! [`StoreError::DimensionMismatch`].
//!
//! Operations are individually consistent per key; nothing is atomic across
//! several chunk writes.

mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::ChunkRecord;

pub use memory::InMemoryChunkStore;
pub use sqlite::{blob_to_vec, vec_to_blob, SqliteChunkStore};

/// Abstract storage backend for chunk records.
///
/// All operations are async (via `async-trait`). Results of the `query_*`
/// operations are ordered by document id, then chunk index.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Embedding dimensionality this store accepts.
    fn dims(&self) -> usize;

    /// Insert or replace the record at `(document_id, chunk_index)`.
    async fn put(&self, chunk: &ChunkRecord) -> Result<(), StoreError>;

    async fn query_by_document(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError>;

    async fn query_by_collection(
        &self,
        collection_id: &str,
    ) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Delete every chunk of a document. Returns the number removed.
    async fn delete_all_for_document(&self, document_id: &str) -> Result<usize, StoreError>;

    /// Delete every chunk of a collection. Returns the number removed.
    async fn delete_collection(&self, collection_id: &str) -> Result<usize, StoreError>;

    /// Delete everything. Returns the number removed.
    async fn clear_all(&self) -> Result<usize, StoreError>;
}

/// Reject a record whose embedding does not match the store's dimensionality.
pub(crate) fn check_dims(expected: usize, chunk: &ChunkRecord) -> Result<(), StoreError> {
    if chunk.embedding.len() != expected {
        return Err(StoreError::DimensionMismatch {
            expected,
            actual: chunk.embedding.len(),
        });
    }
    Ok(())
}
