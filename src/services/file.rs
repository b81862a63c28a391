use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::db::MetadataStore;
use crate::error::{AppError, Result};
use crate::models::{FileRecord, ListedFile, NewFileRecord};
use crate::storage::{BlobReader, BlobStore, LocalBlobStore};

/// File service
///
/// The only component that mutates both the metadata index and blob storage.
/// Uploads are copied to a staging key before the record is inserted, and no
/// database lock is held while a copy runs. Deletes keep their transaction
/// open until the blobs are removed; removal is best-effort and never undoes
/// the metadata change.
#[derive(Clone)]
pub struct FileService {
    db: MetadataStore,
    blobs: Arc<dyn BlobStore>,
}

impl FileService {
    pub fn new(db: MetadataStore, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    /// Open the configured database and local blob store
    pub async fn open(config: &Config) -> Result<Self> {
        let db = MetadataStore::new(&config.database)?.open().await?;
        let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&config.storage.local_path));
        tracing::info!(
            "File service ready ({} storage at {})",
            blobs.storage_type(),
            config.storage.local_path
        );
        Ok(Self::new(db, blobs))
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.db
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    /// Store the blob at `path` as `filename` for `owner`
    pub async fn write(
        &self,
        path: &Path,
        filename: &str,
        owner: &str,
        size: i64,
        file_type: &str,
    ) -> Result<FileRecord> {
        validate_upload(filename, owner, size)?;

        if self.db.find_by_filename_and_owner(filename, owner).await?.is_some() {
            return Err(AppError::Duplicate("File already exists".to_string()));
        }

        let record = NewFileRecord::new(filename, owner, size, file_type);
        let created = self.store(path, &record).await?;
        tracing::info!("Stored {} for {} as record {}", filename, owner, created.id);
        Ok(created)
    }

    /// Look up one of `owner`'s files by its hashed name
    pub async fn read(&self, hashedname: &str, owner: &str) -> Result<FileRecord> {
        self.db.find_by_hashed_name_and_owner(hashedname, owner).await
    }

    /// Open a stored blob by its `directory`. Ownership is not checked here.
    pub async fn open_download_stream(&self, path: &str) -> Result<BlobReader> {
        if path.is_empty() {
            return Err(AppError::InvalidArgument("Path not defined".to_string()));
        }

        self.blobs.open(path).await
    }

    /// `owner`'s files with days left under a `max_age_days` retention
    pub async fn list(&self, owner: &str, max_age_days: i64) -> Result<Vec<ListedFile>> {
        if max_age_days <= 0 {
            return Err(AppError::InvalidArgument(
                "Must be at least one day".to_string(),
            ));
        }

        let records = self.db.list_by_owner(owner).await?;
        if records.is_empty() {
            return Err(AppError::NotFound("You have no files".to_string()));
        }

        let now = Utc::now().naive_utc();
        Ok(records
            .into_iter()
            .map(|record| ListedFile::new(record, now, max_age_days))
            .collect())
    }

    /// Delete a file record and its blob
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.db.begin().await?;
        let record = MetadataStore::delete_by_id_on(&mut tx, id).await?;
        self.discard_blob(&record).await;
        tx.commit().await?;

        tracing::info!("Deleted {} of {}", record.filename, record.owner);
        Ok(())
    }

    /// Delete every file at least `age_secs` old. Returns whether anything matched.
    pub async fn sweep_stale(&self, age_secs: i64) -> Result<bool> {
        if age_secs < 0 {
            return Err(AppError::InvalidArgument("Invalid time passed".to_string()));
        }

        // Rows stay visible until commit, so a re-upload of a swept name is
        // refused instead of having its fresh blob removed below
        let mut tx = self.db.begin().await?;
        let removed = MetadataStore::delete_older_than_on(&mut tx, age_secs).await?;
        for record in &removed {
            self.discard_blob(record).await;
        }
        tx.commit().await?;

        if !removed.is_empty() {
            tracing::info!("Swept {} stale files older than {}s", removed.len(), age_secs);
        }
        Ok(!removed.is_empty())
    }

    /// Give `recipient` their own copy of the blob at `path`.
    ///
    /// Returns `Ok(false)` without touching storage when there is no recipient.
    pub async fn share(
        &self,
        path: &Path,
        filename: &str,
        recipient: Option<&str>,
        size: i64,
        file_type: &str,
        sharer: &str,
    ) -> Result<bool> {
        let Some(recipient) = recipient.filter(|r| !r.is_empty()) else {
            return Ok(false);
        };
        if recipient == sharer {
            return Err(AppError::SelfShare("Cannot share to yourself".to_string()));
        }
        validate_upload(filename, recipient, size)?;

        let already_shared = || AppError::Duplicate("That user already has that file".to_string());
        if self
            .db
            .find_by_filename_and_owner(filename, recipient)
            .await?
            .is_some()
        {
            return Err(already_shared());
        }

        let record = NewFileRecord::new(filename, recipient, size, file_type);
        let created = self.store(path, &record).await.map_err(|e| match e {
            AppError::Duplicate(_) => already_shared(),
            other => other,
        })?;
        tracing::info!(
            "{} shared {} with {} as record {}",
            sharer,
            filename,
            recipient,
            created.id
        );
        Ok(true)
    }

    /// Copy the blob to a staging key, insert `record`, then move the blob
    /// into place.
    ///
    /// A writer that loses the insert to a concurrent upload of the same pair
    /// only ever touched its own staging key.
    async fn store(&self, source: &Path, record: &NewFileRecord) -> Result<FileRecord> {
        let staging = staging_key(&record.owner);
        if let Err(e) = self.blobs.put(source, &staging).await {
            tracing::warn!("Copy of {} failed: {}", record.directory, e);
            self.discard_partial(&staging).await;
            return Err(e);
        }

        let created = match self.db.insert(record).await {
            Ok(created) => created,
            Err(e) => {
                self.discard_partial(&staging).await;
                return Err(e);
            }
        };

        if let Err(e) = self.blobs.rename(&staging, &record.directory).await {
            tracing::warn!(
                "Moving {} into place failed, removing record {}: {}",
                record.directory,
                created.id,
                e
            );
            if let Err(undo) = self.db.delete_by_id(created.id).await {
                tracing::warn!("Failed to remove record {}: {}", created.id, undo);
            }
            self.discard_partial(&staging).await;
            return Err(e);
        }

        Ok(created)
    }

    async fn discard_blob(&self, record: &FileRecord) {
        if let Err(e) = self.blobs.remove(&record.directory).await {
            tracing::warn!(
                "Failed to remove blob {} of record {}: {}",
                record.directory,
                record.id,
                e
            );
        }
    }

    async fn discard_partial(&self, key: &str) {
        if let Err(e) = self.blobs.remove(key).await {
            tracing::warn!("Failed to clean up partial blob {}: {}", key, e);
        }
    }
}

/// Unique hidden key in `owner`'s namespace for an upload in flight
fn staging_key(owner: &str) -> String {
    format!("{}/.upload-{}", owner, Uuid::new_v4())
}

/// Reject names that would escape the owner's storage namespace
fn validate_upload(filename: &str, owner: &str, size: i64) -> Result<()> {
    if !is_plain_segment(filename) {
        return Err(AppError::InvalidArgument("Invalid file name".to_string()));
    }
    if !is_plain_segment(owner) {
        return Err(AppError::InvalidArgument("Invalid owner".to_string()));
    }
    if size < 0 {
        return Err(AppError::InvalidArgument("Invalid file size".to_string()));
    }
    Ok(())
}

fn is_plain_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_segments() {
        assert!(is_plain_segment("report.pdf"));
        assert!(is_plain_segment("..hidden"));
        for bad in ["", ".", "..", "a/b", "a\\b", "nul\0byte"] {
            assert!(!is_plain_segment(bad), "{:?}", bad);
        }
    }

    #[test]
    fn test_staging_keys_stay_in_owner_namespace() {
        let a = staging_key("alice");
        let b = staging_key("alice");
        assert!(a.starts_with("alice/.upload-"));
        assert_ne!(a, b);
        assert!(is_plain_segment(a.trim_start_matches("alice/")));
    }

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload("a.jpg", "u", 0).is_ok());
        assert_eq!(
            validate_upload("../a.jpg", "u", 1).unwrap_err().message(),
            "Invalid file name"
        );
        assert_eq!(
            validate_upload("a.jpg", "u/v", 1).unwrap_err().message(),
            "Invalid owner"
        );
        assert_eq!(
            validate_upload("a.jpg", "u", -1).unwrap_err().message(),
            "Invalid file size"
        );
    }
}
