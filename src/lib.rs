//! # Context Retrieval
//!
//! The retrieval half of a retrieval-augmented chat system: documents are
//! extracted, normalized, chunked, embedded and stored; a query is embedded,
//! ranked against one collection by cosine similarity, and the best chunks
//! are rendered into a provenance-labeled context block for the chat model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────────────┐   ┌──────────────┐
//! │ Blob     │──▶│ extract → normalize →  │──▶│ Chunk store  │
//! │ store    │   │ chunk → embed (batched)│   │ SQLite / mem │
//! └──────────┘   └────────────────────────┘   └──────┬───────┘
//!                                                     │
//!                    ┌──────────────────────────────┤
//!                    ▼                              ▼
//!             ┌─────────────┐               ┌─────────────┐
//!             │ rank top-k  │──────────────▶│  context    │
//!             │ (cosine)    │               │  assembly   │
//!             └─────────────┘               └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ctxr init
//! ctxr ingest ./docs --collection handbook
//! ctxr query "refund window" --collection handbook
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and identifiers |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | Text extraction from PDF, DOCX, PPTX, XLSX and plain text |
//! | [`normalize`] | Whitespace and control-character normalization |
//! | [`chunk`] | Overlapping, boundary-aware chunking |
//! | [`embedding`] | Embedding providers and response parsing |
//! | [`completion`] | Chat-completion backend used by generative providers |
//! | [`summary`] | Per-document summaries |
//! | [`similarity`] | Cosine similarity and top-k ranking |
//! | [`store`] | Chunk store trait, SQLite and in-memory stores |
//! | [`blob`] | Raw document storage |
//! | [`context`] | Context and overview assembly |
//! | [`pipeline`] | Ingestion and retrieval orchestration |
//! | [`request_log`] | Per-request structured log |
//! | [`progress`] | Ingestion progress reporting |
//! | [`ingest`] / [`query`] | CLI command runners |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Tracing subscriber setup |

pub mod blob;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod request_log;
pub mod similarity;
pub mod store;
pub mod summary;
