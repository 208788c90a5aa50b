//! `ctxr query` and `ctxr chunks`.

use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::ingest::locator_for_path;
use crate::pipeline::Retriever;
use crate::request_log::RequestLog;

pub async fn run_query(
    config: &Config,
    query: &str,
    collection: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let retriever = Retriever::from_config(config).await?;
    let mut log = RequestLog::new();
    let result = retriever.retrieve(query, collection, top_k, &mut log).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.context);
    println!();
    if result.overview {
        println!("(overview from document summaries)");
    } else {
        for (i, m) in result.matches.iter().enumerate() {
            println!(
                "{}. [{:.2}] {} #{}",
                i + 1,
                m.score,
                m.file_name,
                m.chunk_index
            );
        }
    }
    println!("sources:");
    for source in &result.source_documents {
        println!("  {} ({})", source.file_name, source.source_locator);
    }
    Ok(())
}

/// List the stored chunks of one document, by locator or local path.
pub async fn run_chunks(config: &Config, target: &str) -> Result<()> {
    let path = Path::new(target);
    let locator = if path.exists() {
        locator_for_path(path)?
    } else {
        target.to_string()
    };

    let retriever = Retriever::from_config(config).await?;
    let chunks = retriever.chunks_for_locator(&locator).await?;
    if chunks.is_empty() {
        println!("No chunks stored for {}", locator);
        return Ok(());
    }

    println!("{} ({} chunks)", locator, chunks.len());
    if let Some(summary) = chunks.first().and_then(|c| c.metadata.summary.as_deref()) {
        println!("summary: {}", summary);
    }
    for chunk in &chunks {
        let preview: String = chunk.text.chars().take(80).collect();
        println!(
            "  #{:<3} {:>4} chars  {:>3} words  [{}]  {}",
            chunk.chunk_index,
            chunk.metadata.char_length,
            chunk.metadata.token_estimate,
            chunk.collection_id,
            preview
        );
    }
    Ok(())
}
