//! In-memory [`ChunkStore`] implementation for testing.
//!
//! Uses a `BTreeMap` keyed by `(document_id, chunk_index)` behind
//! `std::sync::RwLock`, which gives upsert semantics and the trait's
//! ordering for free.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{check_dims, ChunkStore};
use crate::error::StoreError;
use crate::models::ChunkRecord;

type ChunkKey = (String, i64);

/// In-memory store for tests and ephemeral runs.
pub struct InMemoryChunkStore {
    dims: usize,
    chunks: RwLock<BTreeMap<ChunkKey, ChunkRecord>>,
}

impl InMemoryChunkStore {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            chunks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Total number of stored chunks.
    pub fn len(&self) -> usize {
        self.read().map(|chunks| chunks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<ChunkKey, ChunkRecord>>, StoreError> {
        self.chunks
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<ChunkKey, ChunkRecord>>, StoreError> {
        self.chunks
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn remove_where(&self, pred: impl Fn(&ChunkRecord) -> bool) -> Result<usize, StoreError> {
        let mut chunks = self.write()?;
        let before = chunks.len();
        chunks.retain(|_, c| !pred(c));
        Ok(before - chunks.len())
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn put(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        check_dims(self.dims, chunk)?;
        self.write()?.insert(
            (chunk.document_id.clone(), chunk.chunk_index),
            chunk.clone(),
        );
        Ok(())
    }

    async fn query_by_document(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        Ok(self
            .read()?
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn query_by_collection(
        &self,
        collection_id: &str,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        Ok(self
            .read()?
            .values()
            .filter(|c| c.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn delete_all_for_document(&self, document_id: &str) -> Result<usize, StoreError> {
        self.remove_where(|c| c.document_id == document_id)
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<usize, StoreError> {
        self.remove_where(|c| c.collection_id == collection_id)
    }

    async fn clear_all(&self) -> Result<usize, StoreError> {
        let mut chunks = self.write()?;
        let count = chunks.len();
        chunks.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{chunk_id_for, ChunkMetadata};

    fn record(doc: &str, idx: i64, collection: &str, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            chunk_id: chunk_id_for(doc, idx),
            document_id: doc.to_string(),
            chunk_index: idx,
            collection_id: collection.to_string(),
            text: format!("chunk {} of {}", idx, doc),
            embedding,
            metadata: ChunkMetadata {
                file_name: format!("{}.txt", doc),
                source_locator: doc.to_string(),
                position: idx,
                char_length: 10,
                token_estimate: 4,
                text_hash: String::new(),
                content_hash: String::new(),
                summary: None,
            },
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_is_an_upsert() {
        let store = InMemoryChunkStore::new(2);
        store.put(&record("a", 0, "c", vec![1.0, 0.0])).await.unwrap();
        let mut replacement = record("a", 0, "c", vec![0.0, 1.0]);
        replacement.text = "replaced".to_string();
        store.put(&replacement).await.unwrap();

        let chunks = store.query_by_document("a").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "replaced");
    }

    #[tokio::test]
    async fn rejects_wrong_dimensionality() {
        let store = InMemoryChunkStore::new(3);
        let err = store.put(&record("a", 0, "c", vec![1.0])).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn queries_and_deletes_are_scoped() {
        let store = InMemoryChunkStore::new(1);
        for (doc, collection) in [("a", "x"), ("b", "x"), ("c", "y")] {
            for idx in 0..2 {
                store.put(&record(doc, idx, collection, vec![1.0])).await.unwrap();
            }
        }

        assert_eq!(store.query_by_collection("x").await.unwrap().len(), 4);
        assert_eq!(store.delete_all_for_document("a").await.unwrap(), 2);
        assert_eq!(store.delete_all_for_document("a").await.unwrap(), 0);
        assert_eq!(store.delete_collection("x").await.unwrap(), 2);
        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn document_query_is_ordered_by_index() {
        let store = InMemoryChunkStore::new(1);
        for idx in [2, 0, 1] {
            store.put(&record("a", idx, "x", vec![1.0])).await.unwrap();
        }
        let order: Vec<i64> = store
            .query_by_document("a")
            .await
            .unwrap()
            .iter()
            .map(|c| c.chunk_index)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
