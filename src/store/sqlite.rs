//! SQLite-backed [`ChunkStore`].
//!
//! Each chunk is one row of the `chunks` table (see [`crate::migrate`]);
//! the embedding is a little-endian `f32` BLOB and the metadata a JSON
//! column. The store's dimensionality lives in `store_meta` and is checked
//! every time the store is opened.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::{check_dims, ChunkStore};
use crate::error::StoreError;
use crate::migrate;
use crate::models::{ChunkMetadata, ChunkRecord};

const SELECT_COLUMNS: &str = "SELECT chunk_id, document_id, chunk_index, collection_id, text, \
                              embedding, metadata_json, created_at FROM chunks";

/// Durable chunk store over a SQLite pool.
pub struct SqliteChunkStore {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteChunkStore {
    /// Open the store, creating the schema if needed.
    ///
    /// The first open records `dims`; later opens must pass the same value.
    ///
    /// # Errors
    ///
    /// [`StoreError::DimensionMismatch`] if the store was created with a
    /// different dimensionality, [`StoreError::Unavailable`] on database
    /// failure.
    pub async fn open(pool: SqlitePool, dims: usize) -> Result<Self, StoreError> {
        migrate::run_migrations(&pool).await?;

        let recorded: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'dims'")
                .fetch_optional(&pool)
                .await?;

        match recorded {
            Some(value) => {
                let expected: usize = value.parse().map_err(|_| {
                    StoreError::Unavailable(format!("store_meta.dims is not a number: {}", value))
                })?;
                if expected != dims {
                    return Err(StoreError::DimensionMismatch {
                        expected,
                        actual: dims,
                    });
                }
            }
            None => {
                sqlx::query("INSERT INTO store_meta (key, value) VALUES ('dims', ?)")
                    .bind(dims.to_string())
                    .execute(&pool)
                    .await?;
                info!(dims, "initialized chunk store");
            }
        }

        Ok(Self { pool, dims })
    }

    async fn fetch(&self, filter: &str, key: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "{} WHERE {} = ? ORDER BY document_id, chunk_index",
            SELECT_COLUMNS, filter
        ))
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.decode(row)).collect()
    }

    fn decode(&self, row: &SqliteRow) -> Result<ChunkRecord, StoreError> {
        let chunk_id: String = row.try_get("chunk_id")?;
        let blob: Vec<u8> = row.try_get("embedding")?;
        let metadata_json: String = row.try_get("metadata_json")?;
        let created_ms: i64 = row.try_get("created_at")?;

        let corrupt = |reason: String| StoreError::Corrupt {
            chunk_id: chunk_id.clone(),
            reason,
        };

        if blob.len() != self.dims * 4 {
            return Err(corrupt(format!(
                "embedding blob is {} bytes, expected {}",
                blob.len(),
                self.dims * 4
            )));
        }
        let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
            .map_err(|e| corrupt(format!("invalid metadata: {}", e)))?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(created_ms)
            .ok_or_else(|| corrupt(format!("invalid timestamp: {}", created_ms)))?;

        Ok(ChunkRecord {
            document_id: row.try_get("document_id")?,
            chunk_index: row.try_get("chunk_index")?,
            collection_id: row.try_get("collection_id")?,
            text: row.try_get("text")?,
            embedding: blob_to_vec(&blob),
            metadata,
            created_at,
            chunk_id,
        })
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn put(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        check_dims(self.dims, chunk)?;
        let metadata_json = serde_json::to_string(&chunk.metadata).map_err(|e| {
            StoreError::Corrupt {
                chunk_id: chunk.chunk_id.clone(),
                reason: format!("metadata not serializable: {}", e),
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO chunks (chunk_id, document_id, chunk_index, collection_id, text, embedding, dims, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id, chunk_index) DO UPDATE SET
                chunk_id = excluded.chunk_id,
                collection_id = excluded.collection_id,
                text = excluded.text,
                embedding = excluded.embedding,
                dims = excluded.dims,
                metadata_json = excluded.metadata_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(&chunk.chunk_id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.collection_id)
        .bind(&chunk.text)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(chunk.embedding.len() as i64)
        .bind(&metadata_json)
        .bind(chunk.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_by_document(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        self.fetch("document_id", document_id).await
    }

    async fn query_by_collection(
        &self,
        collection_id: &str,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        self.fetch("collection_id", collection_id).await
    }

    async fn delete_all_for_document(&self, document_id: &str) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM chunks WHERE collection_id = ?")
            .bind(collection_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn clear_all(&self) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM chunks")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use context_retrieval::store::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -0.5, 0.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
