//! Context assembly for the chat-completion step.
//!
//! Ranked chunks are grouped by their source document and rendered as one
//! labeled section per document:
//!
//! ```text
//! From document "handbook.pdf": <chunk text>
//!
//! <next chunk text>
//!
//! ---
//!
//! From document "faq.md": <chunk text>
//! ```
//!
//! Documents appear in the order of their best-ranked chunk; within a
//! document, chunks keep their original reading order.

use std::collections::HashMap;

use crate::models::{ScoredChunk, SourceDocument};

/// True when the query asks for an overview rather than a specific fact.
///
/// Case-insensitive substring match against `keywords`.
pub fn is_overview_query(query: &str, keywords: &[String]) -> bool {
    let query = query.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .any(|k| !k.is_empty() && query.contains(&k))
}

fn section(file_name: &str, body: &str) -> String {
    format!("From document \"{}\": {}", file_name, body)
}

/// Render ranked chunks as provenance-labeled sections.
pub fn assemble_context(matches: &[ScoredChunk], delimiter: &str) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&ScoredChunk>> = HashMap::new();
    for chunk in matches {
        let group = groups.entry(chunk.document_id.as_str()).or_insert_with(|| {
            order.push(chunk.document_id.as_str());
            Vec::new()
        });
        group.push(chunk);
    }

    order
        .iter()
        .filter_map(|doc| groups.remove(doc))
        .map(|mut chunks| {
            chunks.sort_by_key(|c| c.chunk_index);
            let body = chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            section(&chunks[0].file_name, &body)
        })
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Render stored document summaries for an overview query.
///
/// A single summary is returned verbatim; several become labeled sections.
/// Documents without a summary are skipped. Returns `None` when no
/// document has one.
pub fn assemble_overview(documents: &[SourceDocument], delimiter: &str) -> Option<String> {
    let summarized: Vec<(&SourceDocument, &str)> = documents
        .iter()
        .filter_map(|d| d.summary.as_deref().map(|s| (d, s)))
        .collect();

    match summarized.as_slice() {
        [] => None,
        [(_, summary)] => Some(summary.to_string()),
        many => Some(
            many.iter()
                .map(|(doc, summary)| section(&doc.file_name, summary))
                .collect::<Vec<_>>()
                .join(delimiter),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELIM: &str = "\n\n---\n\n";

    fn scored(doc: &str, idx: i64, score: f32, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk_id: format!("{}_{}", doc, idx),
            document_id: doc.to_string(),
            chunk_index: idx,
            file_name: format!("{}.txt", doc),
            score,
            text: text.to_string(),
        }
    }

    fn source(doc: &str, summary: Option<&str>) -> SourceDocument {
        SourceDocument {
            document_id: doc.to_string(),
            file_name: format!("{}.txt", doc),
            source_locator: format!("blob://{}.txt", doc),
            summary: summary.map(str::to_string),
        }
    }

    #[test]
    fn overview_keywords_match_case_insensitively() {
        let keywords: Vec<String> = vec!["tell me about".into(), "summarize".into()];
        assert!(is_overview_query("Tell me about this", &keywords));
        assert!(is_overview_query("please SUMMARIZE the doc", &keywords));
        assert!(!is_overview_query("refund window for damaged items", &keywords));
        assert!(!is_overview_query("anything", &[String::new()]));
    }

    #[test]
    fn groups_by_document_in_rank_order() {
        let matches = vec![
            scored("b", 3, 0.9, "b three"),
            scored("a", 0, 0.8, "a zero"),
            scored("b", 1, 0.7, "b one"),
        ];
        let context = assemble_context(&matches, DELIM);
        assert_eq!(
            context,
            "From document \"b.txt\": b one\n\nb three\n\n---\n\nFrom document \"a.txt\": a zero"
        );
    }

    #[test]
    fn empty_matches_give_empty_context() {
        assert_eq!(assemble_context(&[], DELIM), "");
    }

    #[test]
    fn single_summary_is_verbatim() {
        let docs = vec![source("a", Some("This is a test doc.")), source("b", None)];
        assert_eq!(
            assemble_overview(&docs, DELIM).as_deref(),
            Some("This is a test doc.")
        );
    }

    #[test]
    fn several_summaries_are_labeled() {
        let docs = vec![source("a", Some("About A.")), source("b", Some("About B."))];
        assert_eq!(
            assemble_overview(&docs, DELIM).unwrap(),
            "From document \"a.txt\": About A.\n\n---\n\nFrom document \"b.txt\": About B."
        );
    }

    #[test]
    fn no_summaries_means_no_overview() {
        assert!(assemble_overview(&[source("a", None)], DELIM).is_none());
    }
}
