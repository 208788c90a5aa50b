//! Generative completion backend.
//!
//! The generative embedder and the summarizer both send a single-turn
//! prompt to a chat model and read back its text. [`CompletionBackend`] is
//! that seam; [`MessagesBackend`] is the live implementation speaking the
//! Anthropic Messages API.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;

const DEFAULT_MESSAGES_URL: &str = "https://api.anthropic.com";
const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const API_VERSION: &str = "2023-06-01";

/// A chat model that completes a single user prompt.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Returns the model identifier.
    fn model_name(&self) -> &str;

    /// Send `prompt` as one user message and return the model's text.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

/// Messages API client with retry and exponential backoff.
pub struct MessagesBackend {
    client: reqwest::Client,
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
}

impl MessagesBackend {
    /// Create a backend from the embedding configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` is not set or the API key variable is
    /// missing from the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for the generative provider"))?;
        let key_env = config
            .api_key_env
            .as_deref()
            .unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(key_env)
            .map_err(|_| anyhow!("{} environment variable not set", key_env))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_MESSAGES_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            model,
            url,
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionBackend for MessagesBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": 0,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/v1/messages", self.url.trim_end_matches('/')))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_messages_response(&json);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow!("Messages API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Messages API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Completion failed after retries")))
    }
}

/// Extract the concatenated text blocks from a Messages API response.
fn parse_messages_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow!("Invalid Messages response: missing content array"))?;

    let text: String = content
        .iter()
        .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        bail!("Invalid Messages response: no text content");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_blocks() {
        let json = serde_json::json!({
            "content": [
                { "type": "text", "text": "[0.1, " },
                { "type": "text", "text": "0.2]" }
            ]
        });
        assert_eq!(parse_messages_response(&json).unwrap(), "[0.1, 0.2]");
    }

    #[test]
    fn rejects_missing_content() {
        let json = serde_json::json!({ "error": { "type": "overloaded_error" } });
        assert!(parse_messages_response(&json).is_err());
    }

    #[test]
    fn rejects_empty_text() {
        let json = serde_json::json!({ "content": [] });
        assert!(parse_messages_response(&json).is_err());
    }
}
