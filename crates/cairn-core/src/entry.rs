//! Backup data model: per-file records and the backup-set chain.
//!
//! Entries serialize with MessagePack. The content address of a set is
//! the digest of these serialized bytes before any compression or
//! encryption is applied, so the same logical content always maps to
//! the same key regardless of transport processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One file captured in a backup set.
///
/// `created` and `modified` are Unix timestamps in nanoseconds.
/// `sub_hashes` lists the file's chunk keys in file order; a file
/// smaller than the chunk size has exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub created: i64,
    pub modified: i64,
    pub size: u64,
    pub is_compressed: bool,
    pub sub_hashes: Vec<String>,
}

impl FileEntry {
    /// Metadata fast path: same path, timestamps, and size means the
    /// file is treated as unchanged and its chunks are not re-read.
    pub fn appears_identical(&self, other: &FileEntry) -> bool {
        self.path == other.path
            && self.created == other.created
            && self.modified == other.modified
            && self.size == other.size
    }
}

/// One backup set: the files captured in a single run, linked to the
/// previous set through `parent_key`.
///
/// `completed` is stamped just before the finished set is written; an
/// in-progress checkpoint carries `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSetEntry {
    pub parent_key: Option<String>,
    pub completed: Option<DateTime<Utc>>,
    pub entries: Vec<FileEntry>,
}

impl BackupSetEntry {
    pub fn new(parent_key: Option<String>) -> Self {
        Self {
            parent_key,
            completed: None,
            entries: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
