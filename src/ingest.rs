//! `ctxr ingest` and `ctxr clear`.
//!
//! Walks a file or directory, archives every matching file in the blob
//! store and ingests it by locator into one collection. Ctrl-C cancels
//! between batches; the document in flight keeps what it already stored.

use std::future::Future;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::blob::FsBlobStore;
use crate::config::Config;
use crate::error::RetrievalError;
use crate::pipeline::{CancelFlag, Retriever};
use crate::request_log::RequestLog;

/// Blob locator for a local file: its canonical path under `blob://`.
pub fn locator_for_path(path: &Path) -> Result<String> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    let key: Vec<String> = canonical
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(FsBlobStore::locator_for(&key.join("/")))
}

pub async fn run_ingest(config: &Config, path: &Path, collection: &str) -> Result<()> {
    let files = collect_files(path, &config.ingest.include_globs)?;
    if files.is_empty() {
        bail!("No ingestible files found under {}", path.display());
    }

    let retriever = Retriever::from_config(config).await?;
    let blobs = retriever
        .blob_store()
        .cloned()
        .context("blob store not configured")?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if watch_interrupts(cancel, tokio::signal::ctrl_c).await {
                eprintln!("Aborted.");
                std::process::exit(130);
            }
        });
    }

    let mut documents = 0usize;
    let mut unchanged = 0usize;
    let mut failed_documents = 0usize;
    let mut stored = 0usize;
    let mut failed = 0usize;

    for file in &files {
        if cancel.is_cancelled() {
            break;
        }

        let locator = locator_for_path(file)?;
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        blobs.put(&locator, &bytes).await?;

        let mut log = RequestLog::new();
        match retriever
            .ingest_locator(&locator, collection, &cancel, &mut log)
            .await
        {
            Ok(report) => {
                documents += 1;
                stored += report.successful_chunks;
                failed += report.failed_chunks;
                let status = if report.unchanged {
                    unchanged += 1;
                    "unchanged".to_string()
                } else if report.cancelled {
                    format!("cancelled, {} skipped", report.skipped_chunks)
                } else {
                    "ok".to_string()
                };
                println!(
                    "  {}  {}/{} chunks  {}",
                    report.file_name, report.successful_chunks, report.total_chunks, status
                );
            }
            Err(RetrievalError::Cancelled(report)) => {
                println!("  {}  cancelled before any chunk was stored", report.file_name);
                break;
            }
            Err(e) => {
                failed_documents += 1;
                eprintln!("  {}  failed: {}", file.display(), e);
            }
        }
    }

    println!("ingest {} -> {}", path.display(), collection);
    println!("  documents: {}", documents);
    println!("  unchanged: {}", unchanged);
    println!("  failed documents: {}", failed_documents);
    println!("  chunks stored: {}", stored);
    println!("  chunks failed: {}", failed);
    if cancel.is_cancelled() {
        println!("cancelled");
    } else if documents == 0 {
        bail!("No document could be ingested");
    } else {
        println!("ok");
    }
    Ok(())
}

pub async fn run_clear(config: &Config, collection: Option<&str>) -> Result<()> {
    let retriever = Retriever::from_config(config).await?;
    match collection {
        Some(collection) => {
            let count = retriever.clear_collection(collection).await?;
            println!("Deleted {} chunks from collection {}.", count, collection);
        }
        None => {
            let count = retriever.clear_all().await?;
            println!("Deleted {} chunks.", count);
        }
    }
    Ok(())
}

/// Cancel on the first interrupt. Returns true once a second interrupt
/// arrives, false if interrupts cannot be received.
async fn watch_interrupts<F, Fut>(cancel: CancelFlag, mut next_interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    eprintln!("Cancelling after the current batch (Ctrl-C again to abort)...");
    cancel.cancel();
    next_interrupt().await.is_ok()
}

/// A single file as-is, or every file under a directory matching `include_globs`.
fn collect_files(path: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        bail!("Path does not exist: {}", path.display());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let include_set = build_globset(include_globs)?;
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
        if include_set.is_match(relative) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
