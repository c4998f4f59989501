//! Local directory source.

use std::fs::{self, File};
use std::path::PathBuf;
use std::time::SystemTime;

use filetime::FileTime;
use tempfile::NamedTempFile;
use tracing::warn;
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::entry::FileEntry;
use crate::error::{CairnError, Result};
use crate::source::Source;
use crate::stream::{ReadProcess, WriteProcess};

/// Files under a root directory, addressed by their path relative to
/// the root with `/` separators.
pub struct FilesystemSource {
    root: PathBuf,
}

impl FilesystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn entry_for(&self, path: &str, metadata: &fs::Metadata) -> Result<FileEntry> {
        let modified = metadata
            .modified()
            .map(system_time_nanos)
            .map_err(|e| CairnError::with_path(path, e))?;
        // Creation time is unsupported on some filesystems; fall back
        // to the modification time so the fast path still works.
        let created = metadata
            .created()
            .map(system_time_nanos)
            .unwrap_or(modified);
        Ok(FileEntry {
            path: path.to_string(),
            created,
            modified,
            size: metadata.len(),
            is_compressed: false,
            sub_hashes: Vec::new(),
        })
    }
}

impl Source for FilesystemSource {
    fn enumerate(
        &self,
        cancel: &CancelToken,
        on_file: &mut (dyn FnMut(FileEntry) -> Result<()> + Send),
    ) -> Result<()> {
        for item in WalkDir::new(&self.root).sort_by_file_name() {
            if cancel.is_cancelled() {
                break;
            }
            let item = match item {
                Ok(item) => item,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !item.file_type().is_file() {
                continue;
            }
            let rel = match item.path().strip_prefix(&self.root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            let metadata = match item.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %rel, error = %err, "skipping file with unreadable metadata");
                    continue;
                }
            };
            match self.entry_for(&rel, &metadata) {
                Ok(entry) => on_file(entry)?,
                Err(err) => {
                    warn!(path = %rel, error = %err, "skipping file with unreadable metadata");
                }
            }
        }
        Ok(())
    }

    fn metadata(&self, path: &str) -> Result<Option<FileEntry>> {
        match fs::metadata(self.full_path(path)) {
            Ok(metadata) if metadata.is_file() => Ok(Some(self.entry_for(path, &metadata)?)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CairnError::with_path(path, err)),
        }
    }

    fn read_file(&self, path: &str, process: ReadProcess<'_>) -> Result<()> {
        let mut file =
            File::open(self.full_path(path)).map_err(|e| CairnError::with_path(path, e))?;
        process(&mut file)
    }

    fn write_file(&self, entry: &FileEntry, process: WriteProcess<'_>) -> Result<()> {
        let full = self.full_path(&entry.path);
        let parent = full.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent).map_err(|e| CairnError::with_path(&entry.path, e))?;

        // Write to a temp file in the target directory and rename, so
        // a crash mid-restore never leaves a half-written file.
        let mut tmp =
            NamedTempFile::new_in(parent).map_err(|e| CairnError::with_path(&entry.path, e))?;
        process(&mut tmp)?;
        tmp.persist(&full)
            .map_err(|e| CairnError::with_path(&entry.path, e.error))?;

        let mtime = FileTime::from_unix_time(
            entry.modified.div_euclid(1_000_000_000),
            entry.modified.rem_euclid(1_000_000_000) as u32,
        );
        filetime::set_file_mtime(&full, mtime).map_err(|e| CairnError::with_path(&entry.path, e))?;
        Ok(())
    }
}

fn system_time_nanos(time: SystemTime) -> i64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(since) => since.as_nanos() as i64,
        Err(before) => -(before.duration().as_nanos() as i64),
    }
}
