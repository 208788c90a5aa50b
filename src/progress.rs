//! Ingestion progress reporting.
//!
//! Reports observable progress while a document's chunks are embedded, so
//! users see how much is left. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;

/// A single progress event for ingestion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestProgressEvent {
    /// Extracting and chunking a document (total unknown yet).
    Preparing { file: String },
    /// `n` chunks attempted out of `total`.
    Embedding { file: String, n: u64, total: u64 },
}

/// Reports ingestion progress. Called by the orchestrator after each batch.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingesting guide.pdf  10 / 42 chunks".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = render(&event);
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn render(event: &IngestProgressEvent) -> String {
    match event {
        IngestProgressEvent::Preparing { file } => format!("ingesting {}  preparing...\n", file),
        IngestProgressEvent::Embedding { file, n, total } => format!(
            "ingesting {}  {} / {} chunks\n",
            file,
            format_number(*n),
            format_number(*total)
        ),
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn render_embedding_line() {
        let line = render(&IngestProgressEvent::Embedding {
            file: "guide.pdf".to_string(),
            n: 10,
            total: 1200,
        });
        assert_eq!(line, "ingesting guide.pdf  10 / 1,200 chunks\n");
    }
}
