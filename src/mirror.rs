//! Local mirror store for reload-resilience.
//!
//! One JSON record per document key, persisted under a data directory:
//!
//! ```text
//! ~/.draftkeeper/
//! ├── draft-post-42.json      # editing the draft attached to post 42
//! └── draft-new-board-7.json  # a new draft for board 7
//! ```
//!
//! Reads are tolerant: missing or corrupt records come back as `None`
//! so a damaged mirror never blocks the editor from starting.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// File extension for mirror records.
const RECORD_EXTENSION: &str = "json";

/// Persisted shadow of the last successful save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    /// Server-assigned draft id.
    pub draft_id: String,
    /// Opaque last-modified token from the server.
    pub last_modified: Option<String>,
    /// Fingerprint of the payload that was actually saved.
    pub snapshot: String,
    /// Server timestamp of the last successful save.
    pub last_saved_at: Option<DateTime<Utc>>,
}

/// Derives the storage key for a document identity.
///
/// Keyed on the parent post when one is known, otherwise on a composite
/// of "new draft for board X" so each board gets its own pending draft.
pub fn storage_key(parent_id: Option<&str>, board_id: &str) -> String {
    match parent_id {
        Some(id) => format!("draft:post:{}", id),
        None => format!("draft:new:{}", board_id),
    }
}

/// File-backed key-value store for [`MirrorRecord`]s.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    data_dir: PathBuf,
}

impl MirrorStore {
    /// Creates a store rooted at a data directory.
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Returns the record path for a storage key.
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.{}", sanitize_key(key), RECORD_EXTENSION))
    }

    /// Reads the record for a key.
    ///
    /// Returns `None` when the record is absent or fails to parse.
    /// Corruption is logged, never propagated.
    pub fn read(&self, key: &str) -> Option<MirrorRecord> {
        let path = self.record_path(key);

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read mirror record");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt mirror record ignored");
                None
            }
        }
    }

    /// Writes the record for a key, creating the data directory if needed.
    pub fn write(&self, key: &str, record: &MirrorRecord) -> Result<(), MirrorError> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| MirrorError::Io(self.data_dir.clone(), e))?;

        let path = self.record_path(key);
        let contents =
            serde_json::to_string(record).map_err(|e| MirrorError::Encode(e.to_string()))?;
        fs::write(&path, contents).map_err(|e| MirrorError::Io(path, e))?;

        Ok(())
    }

    /// Removes the record for a key.
    ///
    /// Returns `Ok(true)` if a record was deleted, `Ok(false)` if none existed.
    pub fn clear(&self, key: &str) -> Result<bool, MirrorError> {
        let path = self.record_path(key);

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MirrorError::Io(path, e)),
        }
    }
}

/// Maps a storage key to a safe file name.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("mirror I/O error at '{0}': {1}")]
    Io(PathBuf, std::io::Error),
    #[error("failed to encode mirror record: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record() -> MirrorRecord {
        MirrorRecord {
            draft_id: "d-1".to_string(),
            last_modified: Some("2024-06-01T12:00:00+00:00".to_string()),
            snapshot: "abc123".to_string(),
            last_saved_at: None,
        }
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(storage_key(Some("42"), "b-1"), "draft:post:42");
        assert_eq!(storage_key(None, "b-1"), "draft:new:b-1");
    }

    #[test]
    fn test_read_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path().to_path_buf());
        assert!(store.read("draft:new:b-1").is_none());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path().to_path_buf());

        store.write("draft:post:42", &record()).unwrap();
        let loaded = store.read("draft:post:42").unwrap();
        assert_eq!(loaded, record());
    }

    #[test]
    fn test_corrupt_record_returns_none() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path().to_path_buf());

        fs::create_dir_all(store.data_dir()).unwrap();
        fs::write(store.record_path("draft:new:b-1"), "{not json").unwrap();

        assert!(store.read("draft:new:b-1").is_none());
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path().to_path_buf());

        store.write("draft:post:42", &record()).unwrap();
        assert!(store.clear("draft:post:42").unwrap());
        assert!(!store.clear("draft:post:42").unwrap());
        assert!(store.read("draft:post:42").is_none());
    }

    #[test]
    fn test_keys_map_to_distinct_files() {
        let dir = tempdir().unwrap();
        let store = MirrorStore::new(dir.path().to_path_buf());

        assert_ne!(
            store.record_path("draft:post:42"),
            store.record_path("draft:new:42")
        );
    }
}
