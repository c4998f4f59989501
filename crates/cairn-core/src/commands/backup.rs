//! Incremental backup: captures one new generation per run.
//!
//! The run walks Init, LoadHead, PreloadProgress, Traverse, Finalize
//! in order. LoadHead pulls the previous generation's entries into a
//! path map for the unchanged-file fast path; PreloadProgress merges a
//! leftover checkpoint on top so a resumed run treats already-captured
//! files as done. Traversal streams every remaining file through the
//! pipeline in fixed-size chunks. A cancelled run finalizes into the
//! `progress` checkpoint and leaves `head` untouched.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::commands::util::load_set;
use crate::destination::{Destination, WriteOptions};
use crate::entry::{BackupSetEntry, FileEntry};
use crate::error::{CairnError, Result};
use crate::filter::FilePredicate;
use crate::keys;
use crate::pipeline::Pipeline;
use crate::pool::BufferPool;
use crate::source::Source;

/// Default chunk size: 100 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

pub struct BackupRequest<'a> {
    pub source: &'a dyn Source,
    pub destination: &'a mut dyn Destination,
    pub pipeline: &'a Pipeline,
    /// Files this returns `false` for are not backed up.
    pub backup_filter: FilePredicate,
    /// Decides `is_compressed` per file, from metadata only.
    pub compression_filter: FilePredicate,
    pub chunk_size: u64,
    /// Checkpoint every N recorded files; 0 disables.
    pub progress_every_files: u64,
    /// Checkpoint every N bytes read; 0 disables.
    pub progress_every_bytes: u64,
    /// Rewrite chunks and re-read unchanged files.
    pub force: bool,
    pub cancel: &'a CancelToken,
    pub buffers: &'a Arc<BufferPool>,
}

#[derive(Debug, Clone, Default)]
pub struct BackupOutcome {
    /// Key of the completed generation; `None` when cancelled.
    pub set_key: Option<String>,
    pub parent_key: Option<String>,
    /// Entries in the written set, reused ones included.
    pub files_recorded: u64,
    /// Unchanged files carried over without re-reading.
    pub files_reused: u64,
    /// Files dropped after per-file errors.
    pub files_skipped: u64,
    pub bytes_read: u64,
    pub cancelled: bool,
}

struct CapturedFile {
    entry: FileEntry,
    bytes_read: u64,
}

/// Reads one file in `chunk_size` pieces, writing each chunk under its
/// content hash. `Ok(None)` means cancellation tripped mid-file; the
/// entry must not be recorded with a partial hash list.
#[allow(clippy::too_many_arguments)]
fn capture(
    source: &dyn Source,
    destination: &mut dyn Destination,
    pipeline: &Pipeline,
    chunk_size: u64,
    options: WriteOptions,
    cancel: &CancelToken,
    buffers: &Arc<BufferPool>,
    mut entry: FileEntry,
) -> Result<Option<CapturedFile>> {
    let compress = entry.is_compressed;
    let mut buffer = buffers.checkout();
    let mut sub_hashes = Vec::new();
    let mut bytes_read = 0u64;
    let mut cancelled = false;

    source.read_file(
        &entry.path,
        Box::new(|reader| {
            let buf = buffer.as_mut_vec();
            buf.resize(chunk_size as usize, 0);
            loop {
                if cancel.is_cancelled() {
                    cancelled = true;
                    return Ok(());
                }
                let mut filled = 0;
                while filled < buf.len() {
                    let n = reader.read(&mut buf[filled..])?;
                    if n == 0 {
                        break;
                    }
                    filled += n;
                }
                if filled == 0 {
                    return Ok(());
                }
                let key =
                    pipeline.hash_and_write(destination, options, compress, &buf[..filled])?;
                sub_hashes.push(key);
                bytes_read += filled as u64;
                if filled < buf.len() {
                    return Ok(());
                }
            }
        }),
    )?;

    if cancelled {
        return Ok(None);
    }
    entry.sub_hashes = sub_hashes;
    Ok(Some(CapturedFile { entry, bytes_read }))
}

/// Persists the in-progress set under `progress`. Pending packs are
/// sealed first so every chunk the checkpoint references is durable.
fn write_checkpoint(
    destination: &mut dyn Destination,
    pipeline: &Pipeline,
    set: &BackupSetEntry,
) -> Result<()> {
    destination.flush()?;
    let bytes = set.to_bytes()?;
    pipeline.write_object(
        destination,
        keys::PROGRESS,
        WriteOptions::CACHE_LOCALLY | WriteOptions::OVERWRITE,
        true,
        &bytes,
    )?;
    Ok(())
}

pub fn run(req: BackupRequest<'_>) -> Result<BackupOutcome> {
    let BackupRequest {
        source,
        destination,
        pipeline,
        backup_filter,
        compression_filter,
        chunk_size,
        progress_every_files,
        progress_every_bytes,
        force,
        cancel,
        buffers,
    } = req;

    destination.init()?;

    let parent_key = pipeline.read_pointer(&*destination, keys::HEAD)?;
    let mut previous: HashMap<String, FileEntry> = HashMap::new();
    if let Some(parent) = &parent_key {
        let head_set = load_set(&*destination, pipeline, parent)?
            .ok_or_else(|| CairnError::MissingObject(parent.clone()))?;
        info!(
            parent = %parent,
            entries = head_set.entries.len(),
            "previous generation loaded"
        );
        for entry in head_set.entries {
            previous.insert(entry.path.clone(), entry);
        }
    }
    if let Some(progress_set) = load_set(&*destination, pipeline, keys::PROGRESS)? {
        info!(
            entries = progress_set.entries.len(),
            "resuming from progress checkpoint"
        );
        // Checkpointed entries shadow the head generation's.
        for entry in progress_set.entries {
            previous.insert(entry.path.clone(), entry);
        }
    }

    let chunk_options = if force {
        WriteOptions::OVERWRITE
    } else {
        WriteOptions::NONE
    };
    let mut set = BackupSetEntry::new(parent_key.clone());
    let mut files_reused = 0u64;
    let mut files_skipped = 0u64;
    let mut bytes_read = 0u64;
    let mut files_since = 0u64;
    let mut bytes_since = 0u64;

    let mut on_file = |mut entry: FileEntry| -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        if !backup_filter(&entry) {
            debug!(path = %entry.path, "excluded by filter");
            return Ok(());
        }

        if !force {
            if let Some(prev) = previous.get(&entry.path) {
                if prev.appears_identical(&entry) {
                    debug!(path = %entry.path, "unchanged, reusing previous entry");
                    set.entries.push(prev.clone());
                    files_reused += 1;
                    files_since += 1;
                    return maybe_checkpoint(
                        &mut *destination,
                        pipeline,
                        &set,
                        cancel,
                        progress_every_files,
                        progress_every_bytes,
                        &mut files_since,
                        &mut bytes_since,
                    );
                }
            }
        }

        let compress = compression_filter(&entry);
        entry.is_compressed = compress;
        let path = entry.path.clone();
        match capture(
            source,
            &mut *destination,
            pipeline,
            chunk_size,
            chunk_options,
            cancel,
            buffers,
            entry,
        ) {
            Ok(Some(captured)) => {
                info!(
                    path = %captured.entry.path,
                    chunks = captured.entry.sub_hashes.len(),
                    bytes = captured.bytes_read,
                    "captured file"
                );
                bytes_read += captured.bytes_read;
                bytes_since += captured.bytes_read;
                files_since += 1;
                set.entries.push(captured.entry);
                maybe_checkpoint(
                    &mut *destination,
                    pipeline,
                    &set,
                    cancel,
                    progress_every_files,
                    progress_every_bytes,
                    &mut files_since,
                    &mut bytes_since,
                )?;
            }
            Ok(None) => {
                // Cancelled mid-file; a partial hash list is never kept.
                debug!(path = %path, "capture cancelled mid-file");
            }
            Err(err) => {
                warn!(path = %path, error = %err, "skipping file");
                files_skipped += 1;
            }
        }
        Ok(())
    };
    source.enumerate(cancel, &mut on_file)?;

    let files_recorded = set.entries.len() as u64;
    if cancel.is_cancelled() {
        write_checkpoint(&mut *destination, pipeline, &set)?;
        info!(
            recorded = files_recorded,
            "backup cancelled, progress checkpointed"
        );
        return Ok(BackupOutcome {
            set_key: None,
            parent_key,
            files_recorded,
            files_reused,
            files_skipped,
            bytes_read,
            cancelled: true,
        });
    }

    set.completed = Some(Utc::now());
    let bytes = set.to_bytes()?;
    let set_key =
        pipeline.hash_and_write(&mut *destination, WriteOptions::CACHE_LOCALLY, true, &bytes)?;
    pipeline.write_pointer(&mut *destination, keys::HEAD, &set_key)?;
    destination.delete(keys::PROGRESS)?;
    destination.flush()?;
    info!(
        set = %set_key,
        recorded = files_recorded,
        reused = files_reused,
        skipped = files_skipped,
        bytes = bytes_read,
        "backup complete"
    );

    Ok(BackupOutcome {
        set_key: Some(set_key),
        parent_key,
        files_recorded,
        files_reused,
        files_skipped,
        bytes_read,
        cancelled: false,
    })
}

#[allow(clippy::too_many_arguments)]
fn maybe_checkpoint(
    destination: &mut dyn Destination,
    pipeline: &Pipeline,
    set: &BackupSetEntry,
    cancel: &CancelToken,
    progress_every_files: u64,
    progress_every_bytes: u64,
    files_since: &mut u64,
    bytes_since: &mut u64,
) -> Result<()> {
    let due = (progress_every_files > 0 && *files_since >= progress_every_files)
        || (progress_every_bytes > 0 && *bytes_since >= progress_every_bytes);
    // Once cancellation is in, finalize owns the checkpoint.
    if !due || cancel.is_cancelled() {
        return Ok(());
    }
    write_checkpoint(destination, pipeline, set)?;
    debug!(entries = set.entries.len(), "progress checkpoint written");
    *files_since = 0;
    *bytes_since = 0;
    Ok(())
}
