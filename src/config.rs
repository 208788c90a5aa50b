use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub blobs: BlobConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlobConfig {
    #[serde(default = "default_blob_root")]
    pub root: PathBuf,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: default_blob_root(),
        }
    }
}

fn default_blob_root() -> PathBuf {
    PathBuf::from("./data/blobs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_words: default_min_words(),
            min_chars: default_min_chars(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}
fn default_min_words() -> usize {
    5
}
fn default_min_chars() -> usize {
    50
}

/// Which implementation family backs the embedding and summary interfaces.
///
/// Chosen once at startup; nothing falls back to the mock at call time.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Live,
    Mock,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_transport")]
    pub transport: Transport,
    /// Live provider: `"generative"` (chat model coerced into vectors) or `"openai"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL override for the live backend.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_format_retries")]
    pub format_retries: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            api_key_env: None,
            max_input_chars: default_max_input_chars(),
            format_retries: default_format_retries(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_transport() -> Transport {
    Transport::Mock
}
fn default_provider() -> String {
    "generative".to_string()
}
fn default_dims() -> usize {
    50
}
fn default_max_input_chars() -> usize {
    2000
}
fn default_format_retries() -> u32 {
    1
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_summary_input_chars")]
    pub max_input_chars: usize,
    /// Chat model for live summaries. Defaults to `embedding.model` when the
    /// embedding provider is `"generative"`.
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_input_chars: default_summary_input_chars(),
            model: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_summary_input_chars() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    /// Upper bound on one chunk's embedding call, retries included.
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub skip_unchanged: bool,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl IngestConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            store_timeout_secs: default_store_timeout_secs(),
            embed_timeout_secs: default_embed_timeout_secs(),
            skip_unchanged: true,
            include_globs: default_include_globs(),
        }
    }
}

fn default_batch_size() -> usize {
    5
}
fn default_batch_delay_ms() -> u64 {
    1000
}
fn default_store_timeout_secs() -> u64 {
    10
}
fn default_embed_timeout_secs() -> u64 {
    120
}
fn default_include_globs() -> Vec<String> {
    ["txt", "md", "pdf", "docx", "pptx", "xlsx"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_overview_keywords")]
    pub overview_keywords: Vec<String>,
    #[serde(default = "default_section_delimiter")]
    pub section_delimiter: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            overview_keywords: default_overview_keywords(),
            section_delimiter: default_section_delimiter(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_overview_keywords() -> Vec<String> {
    ["tell me about", "what is", "summarize", "overview", "summary"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_section_delimiter() -> String {
    "\n\n---\n\n".to_string()
}

impl Config {
    /// Configuration with every section at its default and the store at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            blobs: BlobConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            summary: SummaryConfig::default(),
            ingest: IngestConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        // Validate chunking
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            bail!("chunking.overlap must be smaller than chunking.chunk_size");
        }

        // Validate embedding
        if self.embedding.dims == 0 {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.max_input_chars == 0 {
            bail!("embedding.max_input_chars must be > 0");
        }
        if self.embedding.transport == Transport::Live {
            match self.embedding.provider.as_str() {
                "generative" | "openai" => {}
                other => bail!(
                    "Unknown embedding provider: '{}'. Must be generative or openai.",
                    other
                ),
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when transport is live (provider '{}')",
                    self.embedding.provider
                );
            }
        }

        if self.embedding.transport == Transport::Live
            && self.summary.enabled
            && self.summary.model.is_none()
            && self.embedding.provider != "generative"
        {
            bail!("summary.model must be specified when summaries use a live backend other than the generative provider");
        }

        // Validate ingestion and retrieval
        if self.ingest.batch_size == 0 {
            bail!("ingest.batch_size must be > 0");
        }
        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"./data/x.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.embedding.transport, Transport::Mock);
        assert_eq!(config.embedding.dims, 50);
        assert_eq!(config.ingest.batch_size, 5);
        assert_eq!(config.retrieval.top_k, 3);
        assert!(config
            .retrieval
            .overview_keywords
            .contains(&"tell me about".to_string()));
    }

    #[test]
    fn example_config_parses() {
        let config = parse(include_str!("../config/ctxr.example.toml")).unwrap();
        assert_eq!(config.embedding.transport, Transport::Mock);
        assert_eq!(config.ingest.embed_timeout_secs, 120);
        assert_eq!(config.retrieval.section_delimiter, "\n\n---\n\n");
    }

    #[test]
    fn live_transport_requires_model() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\ntransport = \"live\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = parse(
            "[db]\npath = \"x\"\n[embedding]\ntransport = \"live\"\nprovider = \"carrier-pigeon\"\nmodel = \"m\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn rejects_overlap_not_below_chunk_size() {
        let err = parse("[db]\npath = \"x\"\n[chunking]\nchunk_size = 50\noverlap = 50\n").unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn live_openai_summaries_need_their_own_model() {
        let base = "[db]\npath = \"x\"\n[embedding]\ntransport = \"live\"\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n";
        assert!(parse(base).is_err());
        assert!(parse(&format!("{}[summary]\nenabled = false\n", base)).is_ok());
        assert!(parse(&format!("{}[summary]\nmodel = \"claude-3-5-haiku-latest\"\n", base)).is_ok());
    }

    #[test]
    fn rejects_unknown_transport() {
        assert!(parse("[db]\npath = \"x\"\n[embedding]\ntransport = \"carrier\"\n").is_err());
    }
}
