//! Backup sources: trees of files to capture or restore into.

mod filesystem;
mod grouped;

pub use filesystem::FilesystemSource;
pub use grouped::GroupedSource;

use crate::cancel::CancelToken;
use crate::entry::FileEntry;
use crate::error::Result;
use crate::stream::{ReadProcess, WriteProcess};

/// A tree of files that can be enumerated, read for backup, and
/// written during restore.
///
/// `Sync` because grouped sources enumerate members from worker
/// threads against one shared callback.
pub trait Source: Send + Sync {
    /// Report every file to `on_file`. Enumeration yields metadata
    /// only; `sub_hashes` comes back empty. Checks `cancel` between
    /// files and stops early once it trips. Callback errors abort the
    /// walk.
    fn enumerate(
        &self,
        cancel: &CancelToken,
        on_file: &mut (dyn FnMut(FileEntry) -> Result<()> + Send),
    ) -> Result<()>;

    /// Metadata for one path, or `None` when nothing is there.
    fn metadata(&self, path: &str) -> Result<Option<FileEntry>>;

    /// Stream the file's bytes into `process`.
    fn read_file(&self, path: &str, process: ReadProcess<'_>) -> Result<()>;

    /// Create or replace the file at `entry.path` with the bytes the
    /// process writes, then stamp the entry's modification time on it.
    fn write_file(&self, entry: &FileEntry, process: WriteProcess<'_>) -> Result<()>;
}
