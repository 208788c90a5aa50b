//! # Context Retrieval CLI (`ctxr`)
//!
//! Ingest local documents into a chunk store and retrieve labeled context
//! for a chat query.
//!
//! ## Usage
//!
//! ```bash
//! ctxr --config ./config/ctxr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctxr init` | Create the SQLite chunk store and record its dimensionality |
//! | `ctxr ingest <path>` | Archive, chunk, embed and store a file or directory |
//! | `ctxr query "<text>"` | Rank stored chunks and print the assembled context |
//! | `ctxr chunks <locator>` | List the chunks stored for one document |
//! | `ctxr clear` | Delete stored chunks for a collection, or everything |
//!
//! ## Examples
//!
//! ```bash
//! ctxr init
//! ctxr ingest ./docs --collection handbook
//! ctxr query "refund window for damaged items" --collection handbook
//! ctxr query "tell me about the handbook" --collection handbook --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use context_retrieval::config::load_config;
use context_retrieval::{db, ingest, logging, query, store::SqliteChunkStore};

/// Context Retrieval CLI: document ingestion and context retrieval for
/// retrieval-augmented chat.
#[derive(Parser)]
#[command(
    name = "ctxr",
    about = "Document ingestion and context retrieval for retrieval-augmented chat",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ctxr.toml`.
    #[arg(long, global = true, default_value = "./config/ctxr.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the chunk store.
    ///
    /// Creates the SQLite database, runs migrations and records the
    /// configured embedding dimensionality. Safe to run repeatedly with the
    /// same dimensionality.
    Init,

    /// Ingest a file, or every matching file under a directory.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Collection the chunks belong to.
        #[arg(long, default_value = "default")]
        collection: String,
    },

    /// Retrieve context for a query.
    Query {
        /// The user's question.
        text: String,

        /// Collection to search.
        #[arg(long, default_value = "default")]
        collection: String,

        /// Number of chunks to return (overrides `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List stored chunks for a document locator or local path.
    Chunks {
        locator: String,
    },

    /// Delete stored chunks.
    Clear {
        /// Only clear this collection.
        #[arg(long)]
        collection: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            SqliteChunkStore::open(pool, config.embedding.dims).await?;
            println!(
                "Chunk store initialized ({} dims).",
                config.embedding.dims
            );
        }
        Commands::Ingest { path, collection } => {
            ingest::run_ingest(&config, &path, &collection).await?;
        }
        Commands::Query {
            text,
            collection,
            top_k,
            json,
        } => {
            query::run_query(&config, &text, &collection, top_k, json).await?;
        }
        Commands::Chunks { locator } => {
            query::run_chunks(&config, &locator).await?;
        }
        Commands::Clear { collection } => {
            ingest::run_clear(&config, collection.as_deref()).await?;
        }
    }

    Ok(())
}
