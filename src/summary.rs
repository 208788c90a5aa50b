//! Document-level summaries.
//!
//! At ingestion a [`Summarizer`] condenses the normalized document into a
//! few sentences. The summary is stored on the document's first chunk and
//! answers overview-style queries without a similarity search.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::completion::{CompletionBackend, MessagesBackend};
use crate::config::{Config, EmbeddingConfig, Transport};
use crate::embedding::truncate_input;

const MAX_SUMMARY_TOKENS: u32 = 1024;
const LEAD_SENTENCES: usize = 2;

/// Produces a short summary of a whole document.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Summaries written by a chat model.
pub struct GenerativeSummarizer {
    backend: Arc<dyn CompletionBackend>,
    max_input_chars: usize,
}

impl GenerativeSummarizer {
    pub fn new(backend: Arc<dyn CompletionBackend>, max_input_chars: usize) -> Self {
        Self {
            backend,
            max_input_chars,
        }
    }
}

#[async_trait]
impl Summarizer for GenerativeSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        let prompt = format!(
            "Please provide a concise summary of this document, including its main topic and \
             key points (max 2-3 sentences):\n\n{}",
            truncate_input(text, self.max_input_chars)
        );
        let summary = self.backend.complete(&prompt, MAX_SUMMARY_TOKENS).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            bail!("summary backend returned no text");
        }
        Ok(summary.to_string())
    }
}

/// Offline summarizer: the document's leading sentences.
pub struct LeadSentenceSummarizer {
    sentences: usize,
}

impl Default for LeadSentenceSummarizer {
    fn default() -> Self {
        Self {
            sentences: LEAD_SENTENCES,
        }
    }
}

impl LeadSentenceSummarizer {
    /// The first `self.sentences` sentences of `text`, whitespace-collapsed.
    pub fn lead(&self, text: &str) -> String {
        let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut end = flat.len();
        let mut seen = 0;
        for (idx, c) in flat.char_indices() {
            if matches!(c, '.' | '!' | '?')
                && flat[idx + 1..].chars().next().map_or(true, char::is_whitespace)
            {
                seen += 1;
                if seen == self.sentences {
                    end = idx + 1;
                    break;
                }
            }
        }
        flat[..end].to_string()
    }
}

#[async_trait]
impl Summarizer for LeadSentenceSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        let lead = self.lead(text);
        if lead.is_empty() {
            bail!("document has no text to summarize");
        }
        Ok(lead)
    }
}

/// Create the configured [`Summarizer`], or `None` when summaries are off.
///
/// The mock transport uses [`LeadSentenceSummarizer`]. The live transport
/// talks to the Messages API with `summary.model`, falling back to the
/// generative embedding backend's model and credentials.
pub fn create_summarizer(config: &Config) -> Result<Option<Arc<dyn Summarizer>>> {
    if !config.summary.enabled {
        return Ok(None);
    }

    match config.embedding.transport {
        Transport::Mock => Ok(Some(Arc::new(LeadSentenceSummarizer::default()))),
        Transport::Live => {
            let backend_config = if config.embedding.provider == "generative" {
                EmbeddingConfig {
                    model: config
                        .summary
                        .model
                        .clone()
                        .or_else(|| config.embedding.model.clone()),
                    ..config.embedding.clone()
                }
            } else {
                EmbeddingConfig {
                    model: config.summary.model.clone(),
                    url: None,
                    api_key_env: None,
                    ..config.embedding.clone()
                }
            };
            let backend = MessagesBackend::new(&backend_config)?;
            Ok(Some(Arc::new(GenerativeSummarizer::new(
                Arc::new(backend),
                config.summary.max_input_chars,
            ))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoBackend {
        prompts: Mutex<Vec<String>>,
        answer: String,
    }

    #[async_trait]
    impl CompletionBackend for EchoBackend {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.clone())
        }
    }

    #[tokio::test]
    async fn generative_summary_is_trimmed_and_input_truncated() {
        let backend = Arc::new(EchoBackend {
            prompts: Mutex::new(Vec::new()),
            answer: "  A short test document.\n".to_string(),
        });
        let summarizer = GenerativeSummarizer::new(backend.clone(), 8);
        let summary = summarizer.summarize("abcdefghijklmnop").await.unwrap();
        assert_eq!(summary, "A short test document.");
        let prompt = backend.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("max 2-3 sentences"));
        assert!(prompt.ends_with("abcdefgh..."));
    }

    #[tokio::test]
    async fn blank_generative_summary_is_an_error() {
        let backend = Arc::new(EchoBackend {
            prompts: Mutex::new(Vec::new()),
            answer: "   ".to_string(),
        });
        let summarizer = GenerativeSummarizer::new(backend, 4000);
        assert!(summarizer.summarize("text").await.is_err());
    }

    #[test]
    fn lead_takes_two_sentences() {
        let s = LeadSentenceSummarizer::default();
        assert_eq!(
            s.lead("This is a test doc.  It has\nthree sentences. Here is the third."),
            "This is a test doc. It has three sentences."
        );
    }

    #[test]
    fn lead_ignores_inner_periods() {
        let s = LeadSentenceSummarizer::default();
        assert_eq!(s.lead("Version 1.5 shipped. Done"), "Version 1.5 shipped. Done");
    }

    #[test]
    fn create_respects_enabled_flag() {
        let mut config = Config::with_db_path("x.sqlite");
        assert!(create_summarizer(&config).unwrap().is_some());
        config.summary.enabled = false;
        assert!(create_summarizer(&config).unwrap().is_none());
    }
}
