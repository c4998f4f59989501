//! CSV inventory of recorded generations.
//!
//! Walks the parent chain from `head` newest first (or a single named
//! generation) and emits one row per file, or per chunk in sub-hash
//! mode. Files a newer generation already listed are suppressed unless
//! duplicates are requested, so the default output is the effective
//! content of the store without repetition.

use std::borrow::Cow;
use std::collections::HashSet;
use std::io::Write;

use tracing::{debug, info};

use crate::commands::util::load_set;
use crate::destination::Destination;
use crate::error::{CairnError, Result};
use crate::filter::FilePredicate;
use crate::keys;
use crate::pipeline::Pipeline;

pub struct ReportRequest<'a> {
    pub destination: &'a mut dyn Destination,
    pub pipeline: &'a Pipeline,
    /// Report one generation; `None` walks the whole chain from `head`.
    pub entry_key: Option<&'a str>,
    /// Files this returns `false` for are left out.
    pub report_filter: FilePredicate,
    /// One row per chunk instead of a per-file chunk count.
    pub include_sub_hashes: bool,
    /// Keep rows a newer generation already listed.
    pub include_dupes: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOutcome {
    pub sets: u64,
    pub rows: u64,
}

pub fn run(req: ReportRequest<'_>, out: &mut dyn Write) -> Result<ReportOutcome> {
    let ReportRequest {
        destination,
        pipeline,
        entry_key,
        report_filter,
        include_sub_hashes,
        include_dupes,
    } = req;

    destination.init()?;

    if include_sub_hashes {
        writeln!(out, "EntryKey,Path,IsCompressed,FileSize,SubHash")?;
    } else {
        writeln!(out, "EntryKey,Path,IsCompressed,FileSize,HashCount")?;
    }

    let single = entry_key.is_some();
    let mut next = match entry_key {
        Some(key) => Some(key.to_string()),
        None => pipeline.read_pointer(&*destination, keys::HEAD)?,
    };

    let mut outcome = ReportOutcome::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    while let Some(set_key) = next {
        let set = load_set(&*destination, pipeline, &set_key)?
            .ok_or_else(|| CairnError::MissingObject(set_key.clone()))?;
        debug!(set = %set_key, entries = set.entries.len(), "reporting generation");
        outcome.sets += 1;

        for entry in &set.entries {
            if !report_filter(entry) {
                continue;
            }
            if !include_dupes {
                // Same path and same chunks means the newer row already
                // covers this file.
                let fingerprint = (entry.path.clone(), entry.sub_hashes.join(","));
                if !seen.insert(fingerprint) {
                    continue;
                }
            }

            let key_field = csv_field(&set_key);
            let path_field = csv_field(&entry.path);
            if include_sub_hashes {
                if entry.sub_hashes.is_empty() {
                    // No chunks to list; the row still names the file.
                    writeln!(
                        out,
                        "{key_field},{path_field},{},{},",
                        entry.is_compressed, entry.size
                    )?;
                    outcome.rows += 1;
                } else {
                    for sub in &entry.sub_hashes {
                        writeln!(
                            out,
                            "{key_field},{path_field},{},{},{sub}",
                            entry.is_compressed, entry.size
                        )?;
                        outcome.rows += 1;
                    }
                }
            } else {
                writeln!(
                    out,
                    "{key_field},{path_field},{},{},{}",
                    entry.is_compressed,
                    entry.size,
                    entry.sub_hashes.len()
                )?;
                outcome.rows += 1;
            }
        }

        next = if single { None } else { set.parent_key };
    }
    out.flush()?;

    info!(sets = outcome.sets, rows = outcome.rows, "report finished");
    Ok(outcome)
}

/// Quotes a field containing a comma, quote, or line break, doubling
/// internal quotes. Everything else passes through untouched.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value
        .chars()
        .any(|c| matches!(c, ',' | '"' | '\n' | '\r'))
    {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
