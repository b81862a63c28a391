//! Derivation of the stable identity under which a file is stored.
//!
//! A file's `directory` is its storage key, `<owner>/<filename>`, so two
//! owners uploading the same filename never collide and the key can be
//! rebuilt without a lookup. The `hashed_name` is the handle given out to
//! callers in place of the numeric id.

use sha2::{Digest, Sha256};

/// On-disk identity of one stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub hashed_name: String,
    pub directory: String,
}

/// Derive the identity for `filename` uploaded by `owner`
pub fn derive_identity(filename: &str, owner: &str, size: i64, file_type: &str) -> FileIdentity {
    let size = size.to_string();
    let mut hasher = Sha256::new();
    // Length-prefixed so ("ab", "c") and ("a", "bc") hash differently
    for part in [owner, filename, size.as_str(), file_type] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }

    FileIdentity {
        hashed_name: hex::encode(hasher.finalize()),
        directory: directory_for(owner, filename),
    }
}

/// Storage key of `filename` in `owner`'s namespace
pub fn directory_for(owner: &str, filename: &str) -> String {
    format!("{}/{}", owner, filename)
}
