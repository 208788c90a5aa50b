//! Retrieval orchestrator.
//!
//! [`Retriever`] wires the collaborators together:
//!
//! ```text
//! ingest:   blob ─► extract ─► normalize ─► chunk ─► (embed ─► put) × batch ─► report
//! retrieve: query ─► fetch collection ─► overview? ─► embed ─► rank ─► assemble
//! ```
//!
//! # Ingestion
//!
//! Chunks are processed in fixed-size batches. Within a batch every chunk
//! is embedded and stored concurrently; batches run one after another with a
//! pause in between. A chunk whose embedding or store write fails (or times
//! out) is counted as a failure and does not affect its neighbours. The
//! whole ingestion fails only when no chunk at all could be stored.
//!
//! Re-ingesting a locator first deletes every chunk stored under its
//! document id, and the deletion completes before the first new chunk is
//! written. Ingestion can be cancelled between batches through a
//! [`CancelFlag`].
//!
//! # Retrieval
//!
//! Every chunk of the collection is a candidate. Overview-style queries are
//! answered from stored document summaries when there are any; all other
//! queries are embedded and ranked by cosine similarity.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures_util::future::join_all;
use tracing::debug;

use crate::blob::{BlobStore, FsBlobStore};
use crate::chunk::Chunker;
use crate::config::{Config, IngestConfig, RetrievalConfig};
use crate::context::{assemble_context, assemble_overview, is_overview_query};
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{EmbeddingError, ExtractError, RetrievalError, StoreError};
use crate::extract::{content_type_for_path, DocumentExtractor, TextExtractor};
use crate::models::{
    chunk_id_for, document_id_for, hash_text, ChunkFailure, ChunkMetadata, ChunkRecord,
    DocumentBlob, IngestReport, RetrievalResult, ScoredChunk, SourceDocument,
};
use crate::normalize::normalize_text;
use crate::progress::{IngestProgressEvent, NoProgress, ProgressReporter, StderrProgress};
use crate::request_log::RequestLog;
use crate::similarity::top_k;
use crate::store::{ChunkStore, SqliteChunkStore};
use crate::summary::{create_summarizer, Summarizer};

const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

/// Cooperative cancellation signal for long ingestions.
///
/// Clones share the same flag. The orchestrator checks it before starting
/// each batch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-document values shared by every chunk of one ingestion.
struct DocumentContext<'a> {
    document_id: &'a str,
    collection_id: &'a str,
    blob: &'a DocumentBlob,
    content_hash: &'a str,
    summary: Option<&'a str>,
}

/// The retrieval pipeline over one chunk store and one embedder.
pub struct Retriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn TextExtractor>,
    blobs: Option<Arc<dyn BlobStore>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    progress: Arc<dyn ProgressReporter>,
    chunker: Chunker,
    ingest: IngestConfig,
    retrieval: RetrievalConfig,
}

impl Retriever {
    /// Build a retriever with the default extractor, no blob store, no
    /// summarizer and no progress output.
    ///
    /// # Errors
    ///
    /// [`StoreError::DimensionMismatch`] when the embedder and the store
    /// disagree on dimensionality.
    pub fn new(
        config: &Config,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        if store.dims() != embedder.dims() {
            return Err(StoreError::DimensionMismatch {
                expected: store.dims(),
                actual: embedder.dims(),
            });
        }

        Ok(Self {
            store,
            embedder,
            extractor: Arc::new(DocumentExtractor),
            blobs: None,
            summarizer: None,
            progress: Arc::new(NoProgress),
            chunker: Chunker::from(&config.chunking),
            ingest: config.ingest.clone(),
            retrieval: config.retrieval.clone(),
        })
    }

    /// Assemble the production pipeline described by `config`: the SQLite
    /// store, the configured embedder and summarizer, the filesystem blob
    /// store and progress on stderr.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        let store = SqliteChunkStore::open(pool, config.embedding.dims)
            .await
            .with_context(|| format!("Failed to open chunk store {}", config.db.path.display()))?;
        let embedder = create_embedder(&config.embedding)?;
        let summarizer = create_summarizer(config)?;

        Ok(Self::new(config, Arc::new(store), embedder)?
            .with_blob_store(Arc::new(FsBlobStore::new(&config.blobs.root)))
            .with_summarizer(summarizer)
            .with_progress(Arc::new(StderrProgress)))
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn blob_store(&self) -> Option<&Arc<dyn BlobStore>> {
        self.blobs.as_ref()
    }

    // ============ Ingestion ============

    /// Fetch a document from the blob store and ingest it.
    ///
    /// The content type is inferred from the locator's extension.
    pub async fn ingest_locator(
        &self,
        locator: &str,
        collection_id: &str,
        cancel: &CancelFlag,
        log: &mut RequestLog,
    ) -> Result<IngestReport, RetrievalError> {
        let blobs = self
            .blobs
            .as_ref()
            .ok_or_else(|| RetrievalError::BlobNotFound(locator.to_string()))?;

        let bytes = match blobs.get(locator).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                log.error("fetch", format!("no blob stored under {}", locator));
                return Err(RetrievalError::BlobNotFound(locator.to_string()));
            }
            Err(e) => {
                log.error("fetch", format!("blob store failed for {}: {:#}", locator, e));
                return Err(RetrievalError::BlobNotFound(format!("{} ({:#})", locator, e)));
            }
        };

        let path = Path::new(locator);
        let blob = DocumentBlob {
            locator: locator.to_string(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| locator.to_string()),
            content_type: content_type_for_path(path)
                .unwrap_or(UNKNOWN_CONTENT_TYPE)
                .to_string(),
            bytes,
        };

        self.ingest_blob(&blob, collection_id, cancel, log).await
    }

    /// Extract, chunk, embed and store one document.
    pub async fn ingest_blob(
        &self,
        blob: &DocumentBlob,
        collection_id: &str,
        cancel: &CancelFlag,
        log: &mut RequestLog,
    ) -> Result<IngestReport, RetrievalError> {
        let locator = blob.locator.as_str();
        let document_id = document_id_for(locator);
        log.info(
            "ingest",
            format!(
                "ingesting {} into collection {} as {}",
                locator, collection_id, document_id
            ),
        );
        self.progress.report(IngestProgressEvent::Preparing {
            file: blob.file_name.clone(),
        });

        // Extract
        let text = match self.extractor.extract(blob).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                let source = ExtractError::CorruptInput("no extractable text".to_string());
                log.error("extract", format!("{}: {}", locator, source));
                return Err(RetrievalError::Extraction {
                    locator: locator.to_string(),
                    source,
                });
            }
            Err(source) => {
                log.error("extract", format!("{}: {}", locator, source));
                return Err(RetrievalError::Extraction {
                    locator: locator.to_string(),
                    source,
                });
            }
        };

        // Normalize and chunk
        let normalized = normalize_text(&text);
        let chunks = self.chunker.chunk(&normalized);
        if chunks.is_empty() {
            log.error(
                "chunk",
                format!("{}: no chunk survived filtering", locator),
            );
            return Err(RetrievalError::NoContent {
                locator: locator.to_string(),
            });
        }
        let content_hash = hash_text(&normalized);
        log.info(
            "chunk",
            format!(
                "{} chars normalized into {} chunks",
                normalized.len(),
                chunks.len()
            ),
        );

        let mut report = IngestReport {
            document_id: document_id.clone(),
            source_locator: locator.to_string(),
            file_name: blob.file_name.clone(),
            collection_id: collection_id.to_string(),
            total_chunks: chunks.len(),
            successful_chunks: 0,
            failed_chunks: 0,
            skipped_chunks: 0,
            failures: Vec::new(),
            unchanged: false,
            cancelled: false,
            summary: None,
        };

        let existing = self
            .store_call(self.store.query_by_document(&document_id))
            .await
            .map_err(|e| store_failure(log, "dedupe", locator, e))?;

        if self.ingest.skip_unchanged
            && is_unchanged(&existing, &chunks, collection_id, &content_hash)
        {
            log.info(
                "dedupe",
                format!("{} unchanged; {} chunks kept", locator, existing.len()),
            );
            report.successful_chunks = existing.len();
            report.unchanged = true;
            report.summary = existing.iter().find_map(|c| c.metadata.summary.clone());
            return Ok(report);
        }

        report.summary = self.summarize(&normalized, locator, log).await;

        // Delete-then-insert: stale chunks must be gone before new ones land
        if !existing.is_empty() {
            let deleted = self
                .store_call(self.store.delete_all_for_document(&document_id))
                .await
                .map_err(|e| store_failure(log, "delete", locator, e))?;
            log.info("delete", format!("removed {} stale chunks", deleted));
        }

        let doc = DocumentContext {
            document_id: &document_id,
            collection_id,
            blob,
            content_hash: &content_hash,
            summary: report.summary.as_deref(),
        };

        let batch_size = self.ingest.batch_size.max(1);
        let batch_count = chunks.len().div_ceil(batch_size);
        let mut failures = Vec::new();
        let mut successes = 0usize;
        let mut attempted = 0usize;
        let mut cancelled = false;

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            if batch_no > 0 && !self.ingest.batch_delay().is_zero() {
                tokio::time::sleep(self.ingest.batch_delay()).await;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                log.warn(
                    "embed",
                    format!(
                        "cancelled before batch {}/{}; {} chunks skipped",
                        batch_no + 1,
                        batch_count,
                        chunks.len() - attempted
                    ),
                );
                break;
            }

            let first_index = attempted;
            let results = join_all(batch.iter().enumerate().map(|(offset, text)| {
                self.process_chunk(&doc, (first_index + offset) as i64, text)
            }))
            .await;

            for result in results {
                match result {
                    Ok(()) => successes += 1,
                    Err(failure) => {
                        let mut message = format!(
                            "chunk {} failed at {}: {}",
                            failure.chunk_index, failure.stage, failure.error
                        );
                        if let Some(raw) = &failure.raw_sample {
                            message.push_str(&format!(" (raw output: {:?})", raw));
                        }
                        log.warn(failure.stage, message);
                        failures.push(failure);
                    }
                }
            }
            attempted += batch.len();

            debug!(
                document_id = %document_id,
                batch = batch_no + 1,
                batches = batch_count,
                "batch complete"
            );
            self.progress.report(IngestProgressEvent::Embedding {
                file: blob.file_name.clone(),
                n: attempted as u64,
                total: chunks.len() as u64,
            });
        }

        if successes > 0 && failures.iter().any(|f| f.chunk_index == 0) {
            if let Some(summary) = doc.summary {
                self.carry_summary(&document_id, summary, log).await;
            }
        }

        report.successful_chunks = successes;
        report.failed_chunks = failures.len();
        report.skipped_chunks = chunks.len() - attempted;
        report.cancelled = cancelled;
        report.failures = failures;

        if report.successful_chunks == 0 {
            if cancelled {
                return Err(RetrievalError::Cancelled(Box::new(report)));
            }
            let first_error = report
                .failures
                .first()
                .map(|f| f.error.clone())
                .unwrap_or_default();
            log.error(
                "ingest",
                format!("no chunk of {} could be indexed", locator),
            );
            return Err(RetrievalError::IngestionFailed {
                locator: locator.to_string(),
                total: report.total_chunks,
                failed: report.failed_chunks,
                first_error,
            });
        }

        log.info(
            "ingest",
            format!(
                "{}: {} stored, {} failed, {} skipped",
                locator, report.successful_chunks, report.failed_chunks, report.skipped_chunks
            ),
        );
        Ok(report)
    }

    /// Chunk 0 was not stored: move the summary onto the lowest-index
    /// chunk that was, so overview queries still find it.
    async fn carry_summary(&self, document_id: &str, summary: &str, log: &mut RequestLog) {
        let first = match self.store_call(self.store.query_by_document(document_id)).await {
            Ok(stored) => stored.into_iter().next(),
            Err(e) => {
                log.warn("summary", format!("could not reload chunks to attach summary: {}", e));
                return;
            }
        };
        let Some(mut record) = first else {
            return;
        };
        record.metadata.summary = Some(summary.to_string());
        match self.store_call(self.store.put(&record)).await {
            Ok(()) => log.info(
                "summary",
                format!("summary attached to chunk {}", record.chunk_index),
            ),
            Err(e) => log.warn(
                "summary",
                format!("could not attach summary to chunk {}: {}", record.chunk_index, e),
            ),
        }
    }

    async fn summarize(&self, text: &str, locator: &str, log: &mut RequestLog) -> Option<String> {
        let summarizer = self.summarizer.as_ref()?;
        match summarizer.summarize(text).await {
            Ok(summary) => {
                log.info("summary", format!("summary generated for {}", locator));
                Some(summary)
            }
            Err(e) => {
                log.warn("summary", format!("summary failed for {}: {:#}", locator, e));
                None
            }
        }
    }

    /// Embed and persist one chunk. Never fails the batch; the error is the
    /// chunk's failure record.
    async fn process_chunk(
        &self,
        doc: &DocumentContext<'_>,
        chunk_index: i64,
        text: &str,
    ) -> Result<(), ChunkFailure> {
        let embedding = self.embed_bounded(text).await.map_err(|e| ChunkFailure {
            chunk_index,
            stage: "embed",
            raw_sample: e.raw_sample(),
            error: e.to_string(),
        })?;

        let record = ChunkRecord {
            chunk_id: chunk_id_for(doc.document_id, chunk_index),
            document_id: doc.document_id.to_string(),
            chunk_index,
            collection_id: doc.collection_id.to_string(),
            text: text.to_string(),
            embedding,
            metadata: ChunkMetadata {
                file_name: doc.blob.file_name.clone(),
                source_locator: doc.blob.locator.clone(),
                position: chunk_index,
                char_length: text.chars().count(),
                token_estimate: text.split_whitespace().count(),
                text_hash: hash_text(text),
                content_hash: doc.content_hash.to_string(),
                summary: if chunk_index == 0 {
                    doc.summary.map(str::to_string)
                } else {
                    None
                },
            },
            created_at: Utc::now(),
        };

        self.store_call(self.store.put(&record))
            .await
            .map_err(|e| ChunkFailure {
                chunk_index,
                stage: "store",
                error: e.to_string(),
                raw_sample: None,
            })
    }

    async fn embed_bounded(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let limit = self.ingest.embed_timeout();
        match tokio::time::timeout(limit, self.embedder.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout(limit)),
        }
    }

    async fn store_call<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let limit: Duration = self.ingest.store_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(limit)),
        }
    }

    // ============ Retrieval ============

    /// Build the context for `query` from the chunks of `collection_id`.
    ///
    /// `top_k` overrides the configured default.
    pub async fn retrieve(
        &self,
        query: &str,
        collection_id: &str,
        top_k_override: Option<usize>,
        log: &mut RequestLog,
    ) -> Result<RetrievalResult, RetrievalError> {
        let chunks = self
            .store_call(self.store.query_by_collection(collection_id))
            .await
            .map_err(|e| store_failure(log, "fetch", collection_id, e))?;

        if chunks.is_empty() {
            log.warn(
                "fetch",
                format!("collection {} has no chunks", collection_id),
            );
            return Err(RetrievalError::NoChunks {
                collection_id: collection_id.to_string(),
            });
        }
        log.info(
            "fetch",
            format!("{} candidate chunks in {}", chunks.len(), collection_id),
        );

        let sources = source_documents(&chunks);

        if is_overview_query(query, &self.retrieval.overview_keywords) {
            if let Some(context) = assemble_overview(&sources, &self.retrieval.section_delimiter) {
                log.info("overview", "answered from stored summaries");
                return Ok(RetrievalResult {
                    context,
                    source_documents: sources.into_iter().filter(|s| s.summary.is_some()).collect(),
                    matches: Vec::new(),
                    overview: true,
                });
            }
            log.info("overview", "overview query but no summaries stored");
        }

        let query_vector = match self.embed_bounded(query).await {
            Ok(v) => v,
            Err(e) => {
                log.error("embed", format!("query embedding failed: {}", e));
                return Err(e.into());
            }
        };

        let k = top_k_override.unwrap_or(self.retrieval.top_k).max(1);
        let ranked = top_k(
            &query_vector,
            chunks
                .iter()
                .enumerate()
                .map(|(i, c)| (i, c.embedding.as_slice())),
            k,
        );
        if ranked.is_empty() {
            log.warn(
                "rank",
                format!(
                    "none of {} chunks could be scored against the query vector",
                    chunks.len()
                ),
            );
            return Err(RetrievalError::NoMatches {
                collection_id: collection_id.to_string(),
            });
        }
        log.info(
            "rank",
            format!("{} of {} chunks selected", ranked.len(), chunks.len()),
        );

        let matches: Vec<ScoredChunk> = ranked
            .into_iter()
            .map(|(i, score)| {
                let c = &chunks[i];
                ScoredChunk {
                    chunk_id: c.chunk_id.clone(),
                    document_id: c.document_id.clone(),
                    chunk_index: c.chunk_index,
                    file_name: c.metadata.file_name.clone(),
                    score,
                    text: c.text.clone(),
                }
            })
            .collect();

        let context = assemble_context(&matches, &self.retrieval.section_delimiter);

        let mut cited: Vec<SourceDocument> = Vec::new();
        for m in &matches {
            if cited.iter().any(|s| s.document_id == m.document_id) {
                continue;
            }
            if let Some(source) = sources.iter().find(|s| s.document_id == m.document_id) {
                cited.push(source.clone());
            }
        }

        Ok(RetrievalResult {
            context,
            source_documents: cited,
            matches,
            overview: false,
        })
    }

    // ============ Maintenance ============

    /// Stored chunks of the document at `locator`, in order.
    pub async fn chunks_for_locator(
        &self,
        locator: &str,
    ) -> Result<Vec<ChunkRecord>, RetrievalError> {
        Ok(self
            .store_call(self.store.query_by_document(&document_id_for(locator)))
            .await?)
    }

    pub async fn clear_collection(&self, collection_id: &str) -> Result<usize, RetrievalError> {
        Ok(self
            .store_call(self.store.delete_collection(collection_id))
            .await?)
    }

    pub async fn clear_all(&self) -> Result<usize, RetrievalError> {
        Ok(self.store_call(self.store.clear_all()).await?)
    }
}

/// True when the stored chunks are exactly what this ingestion would write.
fn is_unchanged(
    existing: &[ChunkRecord],
    chunks: &[String],
    collection_id: &str,
    content_hash: &str,
) -> bool {
    !existing.is_empty()
        && existing.len() == chunks.len()
        && existing.iter().zip(chunks).all(|(stored, text)| {
            stored.collection_id == collection_id
                && stored.metadata.content_hash == content_hash
                && &stored.text == text
        })
}

/// One entry per document, in the order documents first appear, with the
/// summary carried by the document's lowest-index chunk that has one.
fn source_documents(chunks: &[ChunkRecord]) -> Vec<SourceDocument> {
    let mut order: Vec<SourceDocument> = Vec::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for chunk in chunks {
        let slot = *seen.entry(chunk.document_id.as_str()).or_insert_with(|| {
            order.push(SourceDocument {
                document_id: chunk.document_id.clone(),
                file_name: chunk.metadata.file_name.clone(),
                source_locator: chunk.metadata.source_locator.clone(),
                summary: None,
            });
            order.len() - 1
        });
        if order[slot].summary.is_none() {
            order[slot].summary = chunk.metadata.summary.clone();
        }
    }
    order
}

fn store_failure(
    log: &mut RequestLog,
    stage: &'static str,
    subject: &str,
    e: StoreError,
) -> RetrievalError {
    log.error(stage, format!("store failure for {}: {}", subject, e));
    RetrievalError::Store(e)
}
