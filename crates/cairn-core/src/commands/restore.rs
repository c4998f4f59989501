//! Restore and verify: lays a recorded generation back onto a source
//! tree, or checks the tree against it without writing.
//!
//! Restore skips files whose live metadata already matches the
//! recorded entry unless forced. Verify walks the same entries but
//! compares live bytes against stored chunks, reporting files that are
//! missing or differ. Either mode survives per-file failures and keeps
//! going; a cancelled run simply stops early.

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::commands::util::load_set;
use crate::destination::{Destination, ReadOptions};
use crate::entry::FileEntry;
use crate::error::{CairnError, Result};
use crate::filter::FilePredicate;
use crate::keys;
use crate::pipeline::Pipeline;
use crate::source::Source;

pub struct RestoreRequest<'a> {
    pub source: &'a dyn Source,
    pub destination: &'a mut dyn Destination,
    pub pipeline: &'a Pipeline,
    /// Generation to restore; `None` follows the `head` pointer.
    pub entry_key: Option<&'a str>,
    /// Files this returns `false` for are left alone.
    pub restore_filter: FilePredicate,
    /// Compare instead of write.
    pub verify: bool,
    /// Rewrite files even when their metadata looks identical.
    pub force: bool,
    pub cancel: &'a CancelToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreIssueKind {
    /// Nothing exists at the recorded path.
    Missing,
    /// The live file's bytes differ from the stored chunks.
    Invalid,
}

/// One file verify found wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreIssue {
    pub path: String,
    pub kind: RestoreIssueKind,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOutcome {
    /// Generation the run worked from; `None` when there was nothing
    /// to restore.
    pub set_key: Option<String>,
    pub files_restored: u64,
    /// Files whose live metadata already matched.
    pub files_skipped: u64,
    /// Files abandoned after an error; the run continued past them.
    pub files_failed: u64,
    /// Verify findings, in set order. Always empty outside verify.
    pub issues: Vec<RestoreIssue>,
    pub cancelled: bool,
}

enum FileAction {
    Restored,
    AlreadyIdentical,
    Interrupted,
}

pub fn run(req: RestoreRequest<'_>) -> Result<RestoreOutcome> {
    let RestoreRequest {
        source,
        destination,
        pipeline,
        entry_key,
        restore_filter,
        verify,
        force,
        cancel,
    } = req;

    destination.init()?;

    let set_key = match entry_key {
        Some(key) => Some(key.to_string()),
        None => pipeline.read_pointer(&*destination, keys::HEAD)?,
    };
    let set_key = match set_key {
        Some(key) => key,
        None => {
            info!("no backup set to restore from");
            return Ok(RestoreOutcome::default());
        }
    };
    let set = load_set(&*destination, pipeline, &set_key)?
        .ok_or_else(|| CairnError::MissingObject(set_key.clone()))?;
    info!(
        set = %set_key,
        entries = set.entries.len(),
        verify = verify,
        "restore started"
    );

    let mut outcome = RestoreOutcome {
        set_key: Some(set_key),
        ..RestoreOutcome::default()
    };
    for entry in &set.entries {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }
        if !restore_filter(entry) {
            debug!(path = %entry.path, "not selected for restore");
            continue;
        }
        if verify {
            match verify_file(source, &*destination, pipeline, cancel, entry) {
                Ok(None) => {}
                Ok(Some(kind)) => {
                    warn!(path = %entry.path, kind = ?kind, "verification failed");
                    outcome.issues.push(RestoreIssue {
                        path: entry.path.clone(),
                        kind,
                    });
                }
                Err(err) => {
                    warn!(path = %entry.path, error = %err, "could not verify file");
                    outcome.files_failed += 1;
                }
            }
        } else {
            match restore_file(source, &*destination, pipeline, cancel, entry, force) {
                Ok(FileAction::Restored) => {
                    info!(path = %entry.path, bytes = entry.size, "restored file");
                    outcome.files_restored += 1;
                }
                Ok(FileAction::AlreadyIdentical) => {
                    debug!(path = %entry.path, "live file already matches");
                    outcome.files_skipped += 1;
                }
                Ok(FileAction::Interrupted) => {
                    outcome.cancelled = true;
                    break;
                }
                Err(err) => {
                    warn!(path = %entry.path, error = %err, "could not restore file");
                    outcome.files_failed += 1;
                }
            }
        }
    }

    if cancel.is_cancelled() {
        outcome.cancelled = true;
    }
    info!(
        restored = outcome.files_restored,
        skipped = outcome.files_skipped,
        failed = outcome.files_failed,
        issues = outcome.issues.len(),
        cancelled = outcome.cancelled,
        "restore finished"
    );
    Ok(outcome)
}

/// Compares the live file against the entry's chunks. Returns the
/// issue found, or `None` when the file checks out. Extra live bytes
/// past the recorded length are tolerated; a short or differing file
/// is not. A missing stored chunk is an error, not a verdict on the
/// live file.
fn verify_file(
    source: &dyn Source,
    destination: &dyn Destination,
    pipeline: &Pipeline,
    cancel: &CancelToken,
    entry: &FileEntry,
) -> Result<Option<RestoreIssueKind>> {
    if source.metadata(&entry.path)?.is_none() {
        return Ok(Some(RestoreIssueKind::Missing));
    }

    let mut verdict = None;
    source.read_file(
        &entry.path,
        Box::new(|reader| {
            let mut live = Vec::new();
            for sub in &entry.sub_hashes {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                let chunk = pipeline
                    .read_object(destination, sub, ReadOptions::NONE, entry.is_compressed)?
                    .ok_or_else(|| CairnError::MissingObject(sub.clone()))?;
                live.resize(chunk.len(), 0);
                let mut filled = 0;
                while filled < live.len() {
                    let count = reader.read(&mut live[filled..])?;
                    if count == 0 {
                        break;
                    }
                    filled += count;
                }
                if filled < chunk.len() || live[..filled] != chunk[..] {
                    verdict = Some(RestoreIssueKind::Invalid);
                    return Ok(());
                }
            }
            Ok(())
        }),
    )?;
    Ok(verdict)
}

/// Writes the entry's chunks back in order, or skips the file when its
/// live metadata already matches and `force` is off. Cancellation
/// between chunks abandons the write; the truncated result fails the
/// size check next time, so a later run rewrites it.
fn restore_file(
    source: &dyn Source,
    destination: &dyn Destination,
    pipeline: &Pipeline,
    cancel: &CancelToken,
    entry: &FileEntry,
    force: bool,
) -> Result<FileAction> {
    if !force {
        if let Some(live) = source.metadata(&entry.path)? {
            if live.appears_identical(entry) {
                return Ok(FileAction::AlreadyIdentical);
            }
        }
    }

    let mut interrupted = false;
    source.write_file(
        entry,
        Box::new(|writer| {
            for sub in &entry.sub_hashes {
                if cancel.is_cancelled() {
                    interrupted = true;
                    return Ok(());
                }
                let chunk = pipeline
                    .read_object(destination, sub, ReadOptions::NONE, entry.is_compressed)?
                    .ok_or_else(|| CairnError::MissingObject(sub.clone()))?;
                writer.write_all(&chunk)?;
            }
            Ok(())
        }),
    )?;
    if interrupted {
        Ok(FileAction::Interrupted)
    } else {
        Ok(FileAction::Restored)
    }
}
