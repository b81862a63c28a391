//! Per-user file store: an indexed SQLite table of file records backed by
//! blobs on the local file system, with sharing and stale-file eviction.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod naming;
pub mod services;
pub mod storage;

pub use config::Config;
pub use db::MetadataStore;
pub use error::{AppError, ErrorKind, Result};
pub use models::{FileCategory, FileRecord, ListedFile, NewFileRecord};
pub use services::FileService;
pub use storage::{BlobReader, BlobStore, LocalBlobStore};
