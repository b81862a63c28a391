use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

use crate::naming::derive_identity;

/// Metadata of one stored file
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub filename: String,
    /// Storage key of the blob, always `<owner>/<filename>`
    pub directory: String,
    /// User the record is listed under; the recipient for shared files
    pub owner: String,
    pub filesize: i64,
    pub filetype: String,
    /// Set by the database at insert, UTC
    pub timestamp: NaiveDateTime,
    pub hashedname: String,
}

/// Insert payload: everything but the store-assigned `id` and `timestamp`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileRecord {
    pub filename: String,
    pub directory: String,
    pub owner: String,
    pub filesize: i64,
    pub filetype: String,
    pub hashedname: String,
}

impl NewFileRecord {
    pub fn new(filename: &str, owner: &str, filesize: i64, filetype: &str) -> Self {
        let identity = derive_identity(filename, owner, filesize, filetype);
        Self {
            filename: filename.to_string(),
            directory: identity.directory,
            owner: owner.to_string(),
            filesize,
            filetype: filetype.to_string(),
            hashedname: identity.hashed_name,
        }
    }
}
