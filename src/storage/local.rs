use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::error::{AppError, Result};
use crate::storage::{BlobReader, BlobStore};

// A concurrent remove may prune the parent directory between its creation and the copy
const PUT_ATTEMPTS: usize = 3;

/// Local file system blob store
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Absolute location of `key`. Keys may only contain plain path segments.
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(AppError::InvalidArgument(format!("Invalid storage key: {}", key)));
        }

        Ok(self.base_path.join(relative))
    }

    /// Remove empty directories between `full_path` and the base path
    async fn prune_empty_parents(&self, full_path: &Path) -> Result<()> {
        let mut current_dir = full_path.parent().map(|p| p.to_path_buf());
        while let Some(dir) = current_dir {
            if dir == self.base_path {
                break;
            }
            match fs::read_dir(&dir).await {
                Ok(mut entries) => {
                    if entries.next_entry().await?.is_some() {
                        break; // Not empty
                    }
                    let _ = fs::remove_dir(&dir).await;
                }
                Err(_) => break,
            }
            current_dir = dir.parent().map(|p| p.to_path_buf());
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, source: &Path, key: &str) -> Result<()> {
        let full_path = self.resolve(key)?;

        let mut attempt = 1;
        loop {
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).await?;
            }

            let err = match fs::copy(source, &full_path).await {
                Ok(_) => {
                    tracing::debug!("Copied file from {:?} to {:?}", source, full_path);
                    return Ok(());
                }
                Err(e) => e,
            };

            let parent_vanished = err.kind() == std::io::ErrorKind::NotFound
                && attempt < PUT_ATTEMPTS
                && fs::try_exists(source).await.unwrap_or(false);
            if !parent_vanished {
                return Err(err.into());
            }
            tracing::debug!("Parent of {:?} pruned during copy, retrying", full_path);
            attempt += 1;
        }
    }

    async fn open(&self, key: &str) -> Result<BlobReader> {
        let full_path = self.resolve(key)?;

        let file = fs::File::open(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("File not found: {}", key))
            } else {
                AppError::Io(e)
            }
        })?;

        Ok(Box::pin(file))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let full_path = self.resolve(key)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => tracing::debug!("Deleted file {:?}", full_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        self.prune_empty_parents(&full_path).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;

        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::rename(&from_path, &to_path).await?;
        tracing::debug!("Moved file {:?} to {:?}", from_path, to_path);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_path = self.resolve(key)?;
        Ok(fs::try_exists(&full_path).await?)
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tokio::io::AsyncReadExt;

    fn setup() -> (tempfile::TempDir, LocalBlobStore, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("files"));
        let source = dir.path().join("upload.tmp");
        std::fs::write(&source, b"hello blob").unwrap();
        (dir, store, source)
    }

    #[test]
    fn test_resolve_rejects_escaping_keys() {
        let store = LocalBlobStore::new("/srv/files");
        assert_eq!(
            store.resolve("alice/report.pdf").unwrap(),
            PathBuf::from("/srv/files/alice/report.pdf")
        );
        for key in ["", "../etc/passwd", "alice/../../x", "/etc/passwd", "./a"] {
            let err = store.resolve(key).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "key {:?}", key);
        }
    }

    #[tokio::test]
    async fn test_put_open_remove() {
        let (_dir, store, source) = setup();

        store.put(&source, "alice/a.txt").await.unwrap();
        assert!(store.exists("alice/a.txt").await.unwrap());

        let mut content = String::new();
        store
            .open("alice/a.txt")
            .await
            .unwrap()
            .read_to_string(&mut content)
            .await
            .unwrap();
        assert_eq!(content, "hello blob");

        store.remove("alice/a.txt").await.unwrap();
        assert!(!store.exists("alice/a.txt").await.unwrap());
        // Emptied owner directory is pruned, the base path is kept
        assert!(!store.base_path().join("alice").exists());
        assert!(store.base_path().exists());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (_dir, store, _source) = setup();
        store.remove("alice/missing.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let (_dir, store, _source) = setup();
        let err = store.open("alice/missing.txt").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_rename_replaces_target() {
        let (dir, store, source) = setup();
        let other = dir.path().join("other.tmp");
        std::fs::write(&other, b"newer").unwrap();

        store.put(&source, "alice/a.txt").await.unwrap();
        store.put(&other, "alice/.staged").await.unwrap();
        store.rename("alice/.staged", "alice/a.txt").await.unwrap();

        assert!(!store.exists("alice/.staged").await.unwrap());
        let content = std::fs::read(store.base_path().join("alice/a.txt")).unwrap();
        assert_eq!(content, b"newer");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_put_survives_concurrent_prune() {
        let (_dir, store, source) = setup();

        for i in 0..50 {
            store.put(&source, "u/old.txt").await.unwrap();
            let key = format!("u/new-{}.txt", i);
            // Removing the last blob prunes `u/` while the put is recreating it
            let (removed, put) = tokio::join!(store.remove("u/old.txt"), store.put(&source, &key));
            removed.unwrap();
            put.unwrap();
            assert!(store.exists(&key).await.unwrap());
            store.remove(&key).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_put_missing_source_is_io_error() {
        let (dir, store, _source) = setup();
        let err = store
            .put(&dir.path().join("nope"), "alice/a.txt")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
