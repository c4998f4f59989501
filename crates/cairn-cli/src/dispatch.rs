use std::fs::File;
use std::io;

use cairn_core::cancel::CancelToken;
use cairn_core::commands::{backup, report, restore};
use cairn_core::config::{self, PlanConfig, Registry};
use cairn_core::error::{CairnError, Result};
use cairn_core::filter::{self, FilePredicate};
use cairn_core::pipeline::{EncryptionKey, Pipeline};
use cairn_core::pool::BufferPool;

use crate::cli::Commands;

/// Fallback for `--key` so scripts can keep the key out of argv.
const KEY_ENV: &str = "CAIRN_KEY";

/// Read buffers retained for reuse across files.
const BUFFER_RETAIN: usize = 4;

pub(crate) fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::GenKey => {
            println!("{}", EncryptionKey::generate().to_base64());
            Ok(())
        }
        Commands::Backup {
            source,
            destination,
            plan,
            key,
            progress_files,
            progress_bytes,
            force,
        } => run_backup(
            source,
            destination,
            plan,
            key,
            progress_files,
            progress_bytes,
            force,
        ),
        Commands::Restore {
            source,
            destination,
            key,
            entry,
            prefix,
            verify,
            force,
        } => run_restore(&source, &destination, key, entry, prefix, verify, force),
        Commands::Report {
            destination,
            key,
            entry,
            prefix,
            output,
            subhashes,
            include_dupes,
        } => run_report(&destination, key, entry, prefix, output, subhashes, include_dupes),
    }
}

fn run_backup(
    source: Option<String>,
    destination: Option<String>,
    plan: Option<String>,
    key: Option<String>,
    progress_files: Option<u64>,
    progress_bytes: Option<u64>,
    force: bool,
) -> Result<()> {
    let plan = match plan {
        Some(text) => config::load_plan(&text)?,
        None => {
            let (Some(source), Some(destination)) = (source, destination) else {
                return Err(CairnError::Config(
                    "backup needs --plan, or both --source and --destination".into(),
                ));
            };
            PlanConfig {
                source: config::load_spec(&source)?,
                destination: config::load_spec(&destination)?,
                skip_files_containing: Vec::new(),
                skip_compression_containing: Vec::new(),
                chunk_size: None,
                progress_every_files: None,
                progress_every_bytes: None,
            }
        }
    };

    let pipeline = pipeline_from(key)?;
    let source = Registry::global().source(&plan.source)?;
    let mut destination = Registry::global().destination(&plan.destination)?;
    let cancel = CancelToken::new();
    let buffers = BufferPool::new(BUFFER_RETAIN);

    let outcome = backup::run(backup::BackupRequest {
        source: source.as_ref(),
        destination: &mut *destination,
        pipeline: &pipeline,
        backup_filter: plan.backup_filter(),
        compression_filter: plan.compression_filter(),
        chunk_size: plan.chunk_size.unwrap_or(backup::DEFAULT_CHUNK_SIZE),
        progress_every_files: progress_files.or(plan.progress_every_files).unwrap_or(0),
        progress_every_bytes: progress_bytes.or(plan.progress_every_bytes).unwrap_or(0),
        force,
        cancel: &cancel,
        buffers: &buffers,
    })?;

    match &outcome.set_key {
        Some(set) => println!("Generation recorded: {set}"),
        None => println!("Backup interrupted; checkpoint saved."),
    }
    println!(
        "Files: {} recorded, {} reused, {} skipped ({} bytes read)",
        outcome.files_recorded, outcome.files_reused, outcome.files_skipped, outcome.bytes_read
    );
    Ok(())
}

fn run_restore(
    source: &str,
    destination: &str,
    key: Option<String>,
    entry: Option<String>,
    prefix: Option<String>,
    verify: bool,
    force: bool,
) -> Result<()> {
    let pipeline = pipeline_from(key)?;
    let source = Registry::global().source(&config::load_spec(source)?)?;
    let mut destination = Registry::global().destination(&config::load_spec(destination)?)?;
    let cancel = CancelToken::new();

    let outcome = restore::run(restore::RestoreRequest {
        source: source.as_ref(),
        destination: &mut *destination,
        pipeline: &pipeline,
        entry_key: entry.as_deref(),
        restore_filter: prefix_filter(prefix),
        verify,
        force,
        cancel: &cancel,
    })?;

    if verify {
        for issue in &outcome.issues {
            let tag = match issue.kind {
                restore::RestoreIssueKind::Missing => "MISSING",
                restore::RestoreIssueKind::Invalid => "INVALID",
            };
            println!("{tag} {}", issue.path);
        }
        if outcome.issues.is_empty() && outcome.files_failed == 0 {
            println!("Verify passed.");
            Ok(())
        } else {
            println!(
                "Verify found {} issue(s), {} file(s) unreadable.",
                outcome.issues.len(),
                outcome.files_failed
            );
            Err(CairnError::Other("verification found problems".into()))
        }
    } else {
        println!(
            "Restored: {} file(s) ({} already current, {} failed)",
            outcome.files_restored, outcome.files_skipped, outcome.files_failed
        );
        Ok(())
    }
}

fn run_report(
    destination: &str,
    key: Option<String>,
    entry: Option<String>,
    prefix: Option<String>,
    output: Option<String>,
    subhashes: bool,
    include_dupes: bool,
) -> Result<()> {
    let pipeline = pipeline_from(key)?;
    let mut destination = Registry::global().destination(&config::load_spec(destination)?)?;

    let req = report::ReportRequest {
        destination: &mut *destination,
        pipeline: &pipeline,
        entry_key: entry.as_deref(),
        report_filter: prefix_filter(prefix),
        include_sub_hashes: subhashes,
        include_dupes,
    };

    match output {
        Some(path) => {
            let mut file = File::create(&path)?;
            let outcome = report::run(req, &mut file)?;
            println!(
                "Report written to {path}: {} row(s) across {} generation(s)",
                outcome.rows, outcome.sets
            );
        }
        None => {
            // The CSV itself is the stdout payload; no summary line.
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            report::run(req, &mut lock)?;
        }
    }
    Ok(())
}

fn prefix_filter(prefix: Option<String>) -> FilePredicate {
    match prefix {
        Some(prefix) => filter::matching_prefix(prefix),
        None => filter::include_all(),
    }
}

/// Builds the transform pipeline from `--key`, then `CAIRN_KEY`, then
/// plaintext when neither is set.
fn pipeline_from(key: Option<String>) -> Result<Pipeline> {
    let encoded = match key {
        Some(key) => Some(key),
        None => std::env::var(KEY_ENV).ok(),
    };
    match encoded {
        Some(encoded) => Ok(Pipeline::new(Some(EncryptionKey::from_base64(&encoded)?))),
        None => Ok(Pipeline::plaintext()),
    }
}
