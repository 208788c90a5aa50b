//! Embeddings coerced out of a generative chat model.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::parse::parse_embedding;
use super::{truncate_input, Embedder};
use crate::completion::CompletionBackend;
use crate::error::EmbeddingError;

const MAX_COMPLETION_TOKENS: u32 = 1024;

/// [`Embedder`] that prompts a chat model for a JSON array of numbers.
///
/// The model's answer is untrusted: it is parsed and validated by
/// [`parse_embedding`], and a malformed answer is re-requested up to
/// `format_retries` times before the [`EmbeddingError::Format`] is
/// returned.
pub struct GenerativeEmbedder {
    backend: Arc<dyn CompletionBackend>,
    dims: usize,
    max_input_chars: usize,
    format_retries: u32,
}

impl GenerativeEmbedder {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        dims: usize,
        max_input_chars: usize,
        format_retries: u32,
    ) -> Self {
        Self {
            backend,
            dims,
            max_input_chars,
            format_retries,
        }
    }

    fn prompt(&self, text: &str) -> String {
        format!(
            "Generate a vector embedding for this text. The embedding should be an array of {} \
             floating point numbers between -1 and 1. Respond with ONLY the array in JSON format, \
             no other text:\n\n{}",
            self.dims,
            truncate_input(text, self.max_input_chars)
        )
    }
}

#[async_trait]
impl Embedder for GenerativeEmbedder {
    fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let prompt = self.prompt(text);
        let mut attempt = 0u32;

        loop {
            let raw = self
                .backend
                .complete(&prompt, MAX_COMPLETION_TOKENS)
                .await
                .map_err(|e| EmbeddingError::Backend(e.to_string()))?;

            match parse_embedding(&raw, self.dims) {
                Ok(vector) => {
                    debug!(attempt, dims = vector.len(), "embedding parsed");
                    return Ok(vector);
                }
                Err(err) if attempt < self.format_retries => {
                    warn!(
                        attempt,
                        error = %err,
                        raw = %err.raw_sample().unwrap_or_default(),
                        "malformed embedding output, retrying"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
