use async_trait::async_trait;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

use crate::error::Result;

/// Readable stream over one blob
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Blob storage keyed by a record's `directory`
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Copy the file at `source` into storage under `key`, creating parents as needed
    async fn put(&self, source: &Path, key: &str) -> Result<()>;

    /// Open the blob under `key` for reading
    async fn open(&self, key: &str) -> Result<BlobReader>;

    /// Remove the blob under `key`. A missing blob is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Move the blob under `from` to `to`, replacing any blob already there
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Check if a blob exists. The file service never asks; it is here for
    /// maintenance tooling and tests.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Get the storage type name
    fn storage_type(&self) -> &'static str;
}
