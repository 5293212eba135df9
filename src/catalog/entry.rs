//! Catalog record definitions.
//!
//! Rows are plain data. Relationships (folder parent, file computer) are
//! stored as ids and resolved through [`Catalog`](super::Catalog) lookups,
//! never as owned pointers.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Row id of a [`Computer`].
pub type ComputerId = i64;
/// Row id of a [`Folder`].
pub type FolderId = i64;
/// Row id of a [`FileRecord`].
pub type FileId = i64;

/// A logical scan origin, usually a hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Computer {
    pub id: ComputerId,
    pub name: String,
}

/// A directory that has been observed by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    /// Last path component.
    pub name: String,
    pub absolute_path: String,
    /// Parent folder, if the parent path was cataloged before this one.
    pub parent_id: Option<FolderId>,
    pub computer_id: ComputerId,
    /// Directory mtime in nanoseconds since the Unix epoch.
    pub last_modified: Option<i64>,
    /// Wall-clock time of the last visit, nanoseconds since the Unix epoch.
    pub last_checked: i64,
}

/// A file that has been observed by a scan.
///
/// The natural key is `(computer_id, directory_path, file_name)`. Rows are
/// never physically removed; `is_deleted` marks a tombstone whose
/// `content_hash` is retained for historical matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub file_name: String,
    pub directory_path: String,
    pub computer_id: ComputerId,
    /// Hex digest of the content; `None` when the file was unreadable or empty.
    pub content_hash: Option<String>,
    pub size_bytes: u64,
    /// Filesystem mtime at the last successful hash, nanoseconds since the epoch.
    pub last_modified: i64,
    /// Wall-clock time of the last reconciliation, nanoseconds since the epoch.
    pub last_checked: i64,
    pub is_deleted: bool,
}

impl FileRecord {
    /// Full path of the underlying file on its own computer.
    #[must_use]
    pub fn full_path(&self) -> PathBuf {
        Path::new(&self.directory_path).join(&self.file_name)
    }

    /// Whether this record can take part in duplicate matching.
    #[must_use]
    pub fn is_matchable(&self) -> bool {
        !self.is_deleted && self.content_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// Values for a file row that does not exist yet.
///
/// Built by the scanner after hashing so the row is written in one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub file_name: String,
    pub directory_path: String,
    pub computer_id: ComputerId,
    pub content_hash: Option<String>,
    pub size_bytes: u64,
    pub last_modified: i64,
    pub last_checked: i64,
}

/// Convert a [`SystemTime`] to nanoseconds since the Unix epoch.
///
/// Times before the epoch are clamped to zero; times past the `i64` range
/// saturate.
#[must_use]
pub fn unix_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(_) => 0,
    }
}

/// Inverse of [`unix_nanos`].
#[must_use]
pub fn from_unix_nanos(nanos: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(u64::try_from(nanos).unwrap_or(0))
}

/// Current wall-clock time as nanoseconds since the Unix epoch.
#[must_use]
pub fn now_nanos() -> i64 {
    unix_nanos(SystemTime::now())
}
