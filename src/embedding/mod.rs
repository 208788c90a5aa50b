//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait the orchestrator depends on, and the
//! concrete implementations behind it:
//! - **[`GenerativeEmbedder`]**: asks a chat model for a JSON array and
//!   repairs/validates its free-form answer (see [`parse`]).
//! - **[`OpenAIEmbedder`]**: calls a genuine embeddings endpoint.
//! - **[`MockEmbedder`]**: deterministic, offline feature-hashing vectors.
//!
//! Every implementation guarantees the same contract: a returned vector has
//! exactly [`Embedder::dims`] finite components in `[-1, 1]`; anything else
//! is an [`EmbeddingError`].
//!
//! # Provider Selection
//!
//! [`create_embedder`] picks the implementation once, from the configured
//! [`Transport`] and provider name:
//!
//! ```rust
//! # use context_retrieval::config::EmbeddingConfig;
//! # use context_retrieval::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // transport = "mock"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "mock-hash");
//! assert_eq!(embedder.dims(), 50);
//! ```

mod generative;
mod mock;
mod openai;
pub mod parse;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::completion::MessagesBackend;
use crate::config::{EmbeddingConfig, Transport};
use crate::error::EmbeddingError;

pub use generative::GenerativeEmbedder;
pub use mock::MockEmbedder;
pub use openai::OpenAIEmbedder;

/// Maps a text to a fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `50`).
    fn dims(&self) -> usize;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Create the [`Embedder`] selected by the configuration.
///
/// # Errors
///
/// Returns an error for an unknown live provider, or when the live backend
/// cannot be constructed (missing model or API key).
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.transport {
        Transport::Mock => Ok(Arc::new(MockEmbedder::new(config.dims))),
        Transport::Live => match config.provider.as_str() {
            "generative" => {
                let backend = MessagesBackend::new(config)?;
                Ok(Arc::new(GenerativeEmbedder::new(
                    Arc::new(backend),
                    config.dims,
                    config.max_input_chars,
                    config.format_retries,
                )))
            }
            "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
            other => bail!("Unknown embedding provider: {}", other),
        },
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `...`.
pub(crate) fn truncate_input(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_transport_needs_no_credentials() {
        let config = EmbeddingConfig {
            dims: 8,
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dims(), 8);
    }

    #[test]
    fn live_transport_rejects_unknown_provider() {
        let config = EmbeddingConfig {
            transport: Transport::Live,
            provider: "telepathy".to_string(),
            model: Some("m".to_string()),
            ..EmbeddingConfig::default()
        };
        let err = create_embedder(&config).err().unwrap();
        assert!(err.to_string().contains("telepathy"));
    }

    #[test]
    fn live_transport_requires_api_key() {
        let config = EmbeddingConfig {
            transport: Transport::Live,
            model: Some("m".to_string()),
            api_key_env: Some("CTXR_TEST_KEY_THAT_IS_NEVER_SET".to_string()),
            ..EmbeddingConfig::default()
        };
        let err = create_embedder(&config).err().unwrap();
        assert!(err.to_string().contains("CTXR_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn truncate_input_respects_budget() {
        assert_eq!(truncate_input("short", 10), "short");
        assert_eq!(truncate_input("abcdefghij", 4), "abcd...");
        assert_eq!(truncate_input("ééééé", 2), "éé...");
    }
}
