//! Raw document storage.
//!
//! A [`BlobStore`] keeps the original bytes of ingested documents under a
//! locator, so a document can be re-ingested (or re-extracted) without the
//! caller supplying it again. Locators are opaque strings; the filesystem
//! store maps them to relative paths under its root.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

/// Locator scheme used by [`FsBlobStore`].
pub const BLOB_SCHEME: &str = "blob://";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the bytes stored under `locator`, or `None` if absent.
    async fn get(&self, locator: &str) -> Result<Option<Vec<u8>>>;

    /// Store `bytes` under `locator`, replacing any previous content.
    async fn put(&self, locator: &str, bytes: &[u8]) -> Result<()>;
}

/// Blob store rooted at a directory. `blob://docs/a.pdf` lives at
/// `<root>/docs/a.pdf`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build the locator for a key relative to the root.
    pub fn locator_for(key: &str) -> String {
        format!("{}{}", BLOB_SCHEME, key.trim_start_matches('/'))
    }

    fn path_for(&self, locator: &str) -> Result<PathBuf> {
        let key = locator.strip_prefix(BLOB_SCHEME).unwrap_or(locator);
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("invalid blob locator: {}", locator);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, locator: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(locator)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read blob {}", path.display())),
        }
    }

    async fn put(&self, locator: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(locator)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write blob {}", path.display()))
    }
}

/// Blob store held in memory, for tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, locator: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| anyhow::anyhow!("blob store lock poisoned"))?;
        Ok(blobs.get(locator).cloned())
    }

    async fn put(&self, locator: &str, bytes: &[u8]) -> Result<()> {
        self.blobs
            .write()
            .map_err(|_| anyhow::anyhow!("blob store lock poisoned"))?
            .insert(locator.to_string(), bytes.to_vec());
        Ok(())
    }
}
