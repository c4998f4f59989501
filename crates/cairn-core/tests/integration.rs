use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use cairn_core::cancel::CancelToken;
use cairn_core::commands::backup::{self, BackupOutcome, BackupRequest};
use cairn_core::commands::report::{self, ReportRequest};
use cairn_core::commands::restore::{self, RestoreIssue, RestoreIssueKind, RestoreOutcome, RestoreRequest};
use cairn_core::config::{self, Registry};
use cairn_core::destination::{
    Destination, FilesystemDestination, PackedDestination, ReadOptions, SplitDestination,
    SpoolKind, WriteOptions,
};
use cairn_core::entry::{BackupSetEntry, FileEntry};
use cairn_core::error::{CairnError, Result};
use cairn_core::filter;
use cairn_core::hash;
use cairn_core::keys;
use cairn_core::pipeline::{EncryptionKey, Pipeline};
use cairn_core::pool::BufferPool;
use cairn_core::source::{FilesystemSource, GroupedSource, Source};
use cairn_core::stream::{self, ReadProcess, WriteProcess};

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (path, bytes) in files {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, bytes).unwrap();
    }
}

fn run_backup(
    source: &dyn Source,
    destination: &mut dyn Destination,
    pipeline: &Pipeline,
    chunk_size: u64,
) -> BackupOutcome {
    backup::run(BackupRequest {
        source,
        destination,
        pipeline,
        backup_filter: filter::include_all(),
        compression_filter: filter::default_compression_filter(),
        chunk_size,
        progress_every_files: 0,
        progress_every_bytes: 0,
        force: false,
        cancel: &CancelToken::new(),
        buffers: &BufferPool::new(4),
    })
    .unwrap()
}

fn run_restore(
    source: &dyn Source,
    destination: &mut dyn Destination,
    pipeline: &Pipeline,
) -> RestoreOutcome {
    restore::run(RestoreRequest {
        source,
        destination,
        pipeline,
        entry_key: None,
        restore_filter: filter::include_all(),
        verify: false,
        force: false,
        cancel: &CancelToken::new(),
    })
    .unwrap()
}

fn run_verify(
    source: &dyn Source,
    destination: &mut dyn Destination,
    pipeline: &Pipeline,
) -> RestoreOutcome {
    restore::run(RestoreRequest {
        source,
        destination,
        pipeline,
        entry_key: None,
        restore_filter: filter::include_all(),
        verify: true,
        force: false,
        cancel: &CancelToken::new(),
    })
    .unwrap()
}

fn head_set(destination: &dyn Destination, pipeline: &Pipeline) -> (String, BackupSetEntry) {
    let key = pipeline
        .read_pointer(destination, keys::HEAD)
        .unwrap()
        .unwrap();
    let bytes = pipeline
        .read_object(destination, &key, ReadOptions::FROM_LOCAL_CACHE, true)
        .unwrap()
        .unwrap();
    (key, BackupSetEntry::from_bytes(&bytes).unwrap())
}

fn files_under(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for item in fs::read_dir(&dir).unwrap() {
            let path = item.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(
                    path.strip_prefix(root)
                        .unwrap()
                        .to_string_lossy()
                        .into_owned(),
                );
            }
        }
    }
    files.sort();
    files
}

/// Filesystem store that records which writes actually stored bytes,
/// as opposed to being skipped because the key already existed.
struct CountingDestination {
    inner: FilesystemDestination,
    stored: Mutex<Vec<String>>,
}

impl CountingDestination {
    fn new(root: &Path) -> Self {
        Self {
            inner: FilesystemDestination::new(root),
            stored: Mutex::new(Vec::new()),
        }
    }

    fn stored_count(&self, key: &str) -> usize {
        self.stored.lock().unwrap().iter().filter(|k| *k == key).count()
    }
}

impl Destination for CountingDestination {
    fn init(&mut self) -> Result<()> {
        self.inner.init()
    }

    fn write(
        &mut self,
        key: &str,
        options: WriteOptions,
        process: WriteProcess<'_>,
    ) -> Result<bool> {
        let stored = self.inner.write(key, options, process)?;
        if stored {
            self.stored.lock().unwrap().push(key.to_string());
        }
        Ok(stored)
    }

    fn read(&self, key: &str, options: ReadOptions, process: ReadProcess<'_>) -> Result<bool> {
        self.inner.read(key, options, process)
    }

    fn exists(&self, key: &str, options: ReadOptions) -> Result<bool> {
        self.inner.exists(key, options)
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        self.inner.delete(key)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

#[test]
fn same_content_is_stored_once() {
    let src = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    write_tree(
        src.path(),
        &[
            ("a.txt", b"duplicate body"),
            ("nested/copy.txt", b"duplicate body"),
        ],
    );

    let source = FilesystemSource::new(src.path());
    let mut dest = CountingDestination::new(store.path());
    let pipeline = Pipeline::plaintext();

    run_backup(&source, &mut dest, &pipeline, 1024);
    let chunk_key = hash::digest_bytes(b"duplicate body");
    assert_eq!(dest.stored_count(&chunk_key), 1);

    // A second unchanged run adds nothing under that key either.
    let second = run_backup(&source, &mut dest, &pipeline, 1024);
    assert_eq!(second.files_reused, 2);
    assert_eq!(dest.stored_count(&chunk_key), 1);
}

#[test]
fn chunks_reassemble_across_boundaries() {
    let src = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let content: Vec<u8> = (0..2560u32).map(|i| (i % 251) as u8).collect();
    write_tree(src.path(), &[("blob.bin", &content)]);

    let source = FilesystemSource::new(src.path());
    let mut dest = FilesystemDestination::new(store.path());
    let pipeline = Pipeline::plaintext();
    run_backup(&source, &mut dest, &pipeline, 1024);

    let (_, set) = head_set(&dest, &pipeline);
    assert_eq!(set.entries[0].sub_hashes.len(), 3);

    let target = FilesystemSource::new(out.path());
    let restored = run_restore(&target, &mut dest, &pipeline);
    assert_eq!(restored.files_restored, 1);
    assert_eq!(fs::read(out.path().join("blob.bin")).unwrap(), content);
}

#[test]
fn unchanged_files_are_not_reread() {
    let src = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    write_tree(
        src.path(),
        &[("one.txt", b"first file"), ("two.txt", b"second file")],
    );

    let source = FilesystemSource::new(src.path());
    let mut dest = FilesystemDestination::new(store.path());
    let pipeline = Pipeline::plaintext();

    let first = run_backup(&source, &mut dest, &pipeline, 1024);
    assert_eq!(first.files_recorded, 2);

    let second = run_backup(&source, &mut dest, &pipeline, 1024);
    assert_eq!(second.files_recorded, 0);
    assert_eq!(second.files_reused, 2);
    assert_eq!(second.bytes_read, 0);

    let (_, set) = head_set(&dest, &pipeline);
    assert_eq!(set.parent_key.as_deref(), first.set_key.as_deref());
}

#[test]
fn generations_chain_back_to_the_first() {
    let src = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    let source = FilesystemSource::new(src.path());
    let mut dest = FilesystemDestination::new(store.path());
    let pipeline = Pipeline::plaintext();

    // Distinct lengths, so each run re-captures regardless of
    // timestamp resolution.
    let mut set_keys = Vec::new();
    for content in [&b"one"[..], b"two two", b"three three three"] {
        write_tree(src.path(), &[("file.txt", content)]);
        let outcome = run_backup(&source, &mut dest, &pipeline, 1024);
        set_keys.push(outcome.set_key.unwrap());
    }

    // Walk from head to the first generation; every set's decoded
    // bytes re-hash to the key that addresses it.
    let mut next = pipeline.read_pointer(&dest, keys::HEAD).unwrap();
    let mut walked = Vec::new();
    while let Some(key) = next {
        let bytes = pipeline
            .read_object(&dest, &key, ReadOptions::FROM_LOCAL_CACHE, true)
            .unwrap()
            .unwrap();
        assert_eq!(hash::digest_bytes(&bytes), key);
        let set = BackupSetEntry::from_bytes(&bytes).unwrap();
        assert!(set.completed.is_some());
        walked.push(key);
        next = set.parent_key;
    }
    set_keys.reverse();
    assert_eq!(walked, set_keys);
}

#[test]
fn pipeline_round_trips_and_rejects_wrong_keys() {
    let store = tempfile::tempdir().unwrap();
    let mut dest = FilesystemDestination::new(store.path());
    dest.init().unwrap();

    let keyed = Pipeline::new(Some(EncryptionKey::generate()));
    let plain = Pipeline::plaintext();
    for (case, (pipeline, compress)) in [
        (&plain, false),
        (&plain, true),
        (&keyed, false),
        (&keyed, true),
    ]
    .into_iter()
    .enumerate()
    {
        let payload = format!("case {case}: the quick brown fox jumps over the lazy dog");
        let key = hash::digest_bytes(payload.as_bytes());
        pipeline
            .write_object(&mut dest, &key, WriteOptions::NONE, compress, payload.as_bytes())
            .unwrap();
        let back = pipeline
            .read_object(&dest, &key, ReadOptions::NONE, compress)
            .unwrap()
            .unwrap();
        assert_eq!(back, payload.as_bytes());
    }

    // Wrong key fails authentication.
    let secret = b"wrong key test payload";
    let key = hash::digest_bytes(secret);
    keyed
        .write_object(&mut dest, &key, WriteOptions::OVERWRITE, false, secret)
        .unwrap();
    let other = Pipeline::new(Some(EncryptionKey::generate()));
    let err = other
        .read_object(&dest, &key, ReadOptions::NONE, false)
        .unwrap_err();
    assert!(matches!(err, CairnError::DecryptionFailed));

    // Claiming compression on a plain object fails to decode.
    let raw = b"stored without compression";
    let key = hash::digest_bytes(raw);
    plain
        .write_object(&mut dest, &key, WriteOptions::OVERWRITE, false, raw)
        .unwrap();
    assert!(plain.read_object(&dest, &key, ReadOptions::NONE, true).is_err());
}

#[test]
fn pointers_are_encrypted_at_rest() {
    let store = tempfile::tempdir().unwrap();
    let mut dest = FilesystemDestination::new(store.path());
    dest.init().unwrap();

    let value = hash::digest_bytes(b"some backup set");
    let keyed = Pipeline::new(Some(EncryptionKey::generate()));
    keyed.write_pointer(&mut dest, keys::HEAD, &value).unwrap();

    let on_disk = fs::read(store.path().join("he").join("head")).unwrap();
    assert_ne!(on_disk, value.as_bytes());
    assert_eq!(keyed.read_pointer(&dest, keys::HEAD).unwrap().unwrap(), value);

    // Without a key the pointer is stored as given.
    let plain = Pipeline::plaintext();
    plain.write_pointer(&mut dest, keys::HEAD, &value).unwrap();
    let on_disk = fs::read(store.path().join("he").join("head")).unwrap();
    assert_eq!(on_disk, value.as_bytes());
}

#[test]
fn packed_store_spans_multiple_packs() {
    let store = tempfile::tempdir().unwrap();
    let inner = FilesystemDestination::new(store.path());
    let mut dest = PackedDestination::new(Box::new(inner), 64);
    dest.init().unwrap();

    let payloads: Vec<Vec<u8>> = (0..10)
        .map(|i| format!("pack object {i:02} {}", "=".repeat(25)).into_bytes())
        .collect();
    let mut chunk_keys = Vec::new();
    for payload in &payloads {
        assert_eq!(payload.len(), 40);
        let key = hash::digest_bytes(payload);
        assert!(dest
            .write(&key, WriteOptions::NONE, stream::write_bytes(payload))
            .unwrap());
        chunk_keys.push(key);
    }
    dest.flush().unwrap();

    for (key, payload) in chunk_keys.iter().zip(&payloads) {
        assert!(dest.exists(key, ReadOptions::NONE).unwrap());
        let mut got = Vec::new();
        assert!(dest
            .read(key, ReadOptions::NONE, stream::read_to_vec(&mut got))
            .unwrap());
        assert_eq!(&got, payload);
    }

    // Chunks live inside pack blobs, not as their own store objects.
    let sample = &chunk_keys[0];
    let direct = store.path().join(&sample[..2]).join(sample);
    assert!(!direct.exists());

    // A fresh instance over the same store reloads the chain.
    let mut reopened =
        PackedDestination::new(Box::new(FilesystemDestination::new(store.path())), 64);
    reopened.init().unwrap();
    for (key, payload) in chunk_keys.iter().zip(&payloads) {
        let mut got = Vec::new();
        assert!(reopened
            .read(key, ReadOptions::NONE, stream::read_to_vec(&mut got))
            .unwrap());
        assert_eq!(&got, payload);
    }
}

#[test]
fn whole_plan_runs_through_the_registry() {
    let src = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let content_a: Vec<u8> = (0..1500u32).map(|i| (i % 13) as u8 + b'a').collect();
    let content_b: Vec<u8> = (0..1500u32).map(|i| (i % 7) as u8 + b'0').collect();
    write_tree(
        src.path(),
        &[("deep/a.bin", &content_a), ("b.bin", &content_b)],
    );

    let plan_doc = serde_json::json!({
        "source": { "type": "filesystem", "config": { "base_path": src.path() } },
        "destination": { "type": "packed", "config": {
            "destination": {
                "type": "filesystem",
                "config": { "base_path": store.path() },
            },
            "pack_size": 4096,
            "max_cached_packs": 2,
            "cache_dir": cache.path(),
        } },
        "chunk_size": 512,
    });
    let plan = config::load_plan(&plan_doc.to_string()).unwrap();

    let source = Registry::global().source(&plan.source).unwrap();
    let mut destination = Registry::global().destination(&plan.destination).unwrap();
    let pipeline = Pipeline::new(Some(EncryptionKey::generate()));
    let outcome = backup::run(BackupRequest {
        source: source.as_ref(),
        destination: &mut *destination,
        pipeline: &pipeline,
        backup_filter: plan.backup_filter(),
        compression_filter: plan.compression_filter(),
        chunk_size: plan.chunk_size.unwrap_or(backup::DEFAULT_CHUNK_SIZE),
        progress_every_files: plan.progress_every_files.unwrap_or(0),
        progress_every_bytes: plan.progress_every_bytes.unwrap_or(0),
        force: false,
        cancel: &CancelToken::new(),
        buffers: &BufferPool::new(4),
    })
    .unwrap();
    assert_eq!(outcome.files_recorded, 2);
    drop(destination);

    // Chunks were absorbed into packs on the store below.
    let chunk_key = hash::digest_bytes(&content_a[..512]);
    let below = FilesystemDestination::new(store.path());
    assert!(!below.exists(&chunk_key, ReadOptions::NONE).unwrap());

    // A fresh stack from the same plan restores byte-exact through the
    // pack cache.
    let mut destination = Registry::global().destination(&plan.destination).unwrap();
    let target = FilesystemSource::new(out.path());
    let restored = run_restore(&target, &mut *destination, &pipeline);
    assert_eq!(restored.files_restored, 2);
    assert_eq!(fs::read(out.path().join("deep/a.bin")).unwrap(), content_a);
    assert_eq!(fs::read(out.path().join("b.bin")).unwrap(), content_b);
    assert!(fs::read_dir(cache.path()).unwrap().count() >= 1);
}

#[test]
fn split_destination_mirrors_objects_and_reads_from_the_primary() {
    let src = tempfile::tempdir().unwrap();
    let primary = tempfile::tempdir().unwrap();
    let mirror = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_tree(
        src.path(),
        &[("a.txt", b"mirrored data"), ("b.txt", b"more mirrored data")],
    );

    let source = FilesystemSource::new(src.path());
    let mut dest = SplitDestination::new(
        Box::new(FilesystemDestination::new(primary.path())),
        vec![Box::new(FilesystemDestination::new(mirror.path()))],
        SpoolKind::Memory,
    );
    let pipeline = Pipeline::plaintext();
    run_backup(&source, &mut dest, &pipeline, 1024);

    let primary_files = files_under(primary.path());
    assert!(!primary_files.is_empty());
    assert_eq!(primary_files, files_under(mirror.path()));

    // Reads never touch the secondaries.
    fs::remove_dir_all(mirror.path()).unwrap();
    let target = FilesystemSource::new(out.path());
    let restored = run_restore(&target, &mut dest, &pipeline);
    assert_eq!(restored.files_restored, 2);
    assert_eq!(fs::read(out.path().join("a.txt")).unwrap(), b"mirrored data");
}

#[test]
fn grouped_paths_round_trip() {
    let docs = tempfile::tempdir().unwrap();
    let pics = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    write_tree(docs.path(), &[("notes/plan.txt", b"the plan")]);
    write_tree(pics.path(), &[("cat.jpg", b"not really a jpeg")]);

    let mut source = GroupedSource::new();
    source.add("docs", Box::new(FilesystemSource::new(docs.path())));
    source.add("pics", Box::new(FilesystemSource::new(pics.path())));
    let mut dest = FilesystemDestination::new(store.path());
    let pipeline = Pipeline::plaintext();
    run_backup(&source, &mut dest, &pipeline, 1024);

    let (_, set) = head_set(&dest, &pipeline);
    let mut paths: Vec<_> = set.entries.iter().map(|e| e.path.clone()).collect();
    paths.sort();
    assert_eq!(paths, vec!["docs:notes/plan.txt", "pics:cat.jpg"]);

    let docs_out = tempfile::tempdir().unwrap();
    let pics_out = tempfile::tempdir().unwrap();
    let mut target = GroupedSource::new();
    target.add("docs", Box::new(FilesystemSource::new(docs_out.path())));
    target.add("pics", Box::new(FilesystemSource::new(pics_out.path())));
    let restored = run_restore(&target, &mut dest, &pipeline);
    assert_eq!(restored.files_restored, 2);
    assert_eq!(
        fs::read(docs_out.path().join("notes/plan.txt")).unwrap(),
        b"the plan"
    );
    assert_eq!(
        fs::read(pics_out.path().join("cat.jpg")).unwrap(),
        b"not really a jpeg"
    );
}

#[test]
fn mixed_tree_compresses_and_chunks_per_file() {
    let src = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let text_a = "alpha paragraph. ".repeat(128).into_bytes();
    let text_b = "beta paragraph. ".repeat(128).into_bytes();
    let zeros = vec![0u8; 2 * 1024 * 1024];
    assert_eq!(text_a.len(), 2176);
    write_tree(
        src.path(),
        &[
            ("docs/a.txt", &text_a),
            ("docs/b.txt", &text_b),
            ("archive.zip", &zeros),
        ],
    );

    let source = FilesystemSource::new(src.path());
    let mut dest = FilesystemDestination::new(store.path());
    let pipeline = Pipeline::plaintext();
    let outcome = run_backup(&source, &mut dest, &pipeline, 1024 * 1024);
    assert_eq!(outcome.files_recorded, 3);

    let (_, set) = head_set(&dest, &pipeline);
    assert_eq!(set.entries.len(), 3);
    let zip = set
        .entries
        .iter()
        .find(|e| e.path == "archive.zip")
        .unwrap();
    // Already-compressed format: stored as-is, in two identical
    // megabyte chunks that dedup to one object.
    assert!(!zip.is_compressed);
    assert_eq!(zip.sub_hashes.len(), 2);
    assert_eq!(zip.sub_hashes[0], zip.sub_hashes[1]);
    for text in set.entries.iter().filter(|e| e.path != "archive.zip") {
        assert!(text.is_compressed);
        assert_eq!(text.sub_hashes.len(), 1);
    }

    let target = FilesystemSource::new(out.path());
    let restored = run_restore(&target, &mut dest, &pipeline);
    assert_eq!(restored.files_restored, 3);
    assert_eq!(fs::read(out.path().join("archive.zip")).unwrap(), zeros);
    assert_eq!(fs::read(out.path().join("docs/a.txt")).unwrap(), text_a);
}

/// Source that trips the shared cancel token after a number of
/// completed file reads.
struct TrippingSource {
    inner: FilesystemSource,
    cancel: CancelToken,
    trip_after: usize,
    reads: AtomicUsize,
}

impl Source for TrippingSource {
    fn enumerate(
        &self,
        cancel: &CancelToken,
        on_file: &mut (dyn FnMut(FileEntry) -> Result<()> + Send),
    ) -> Result<()> {
        self.inner.enumerate(cancel, on_file)
    }

    fn metadata(&self, path: &str) -> Result<Option<FileEntry>> {
        self.inner.metadata(path)
    }

    fn read_file(&self, path: &str, process: ReadProcess<'_>) -> Result<()> {
        self.inner.read_file(path, process)?;
        if self.reads.fetch_add(1, Ordering::SeqCst) + 1 == self.trip_after {
            self.cancel.cancel();
        }
        Ok(())
    }

    fn write_file(&self, entry: &FileEntry, process: WriteProcess<'_>) -> Result<()> {
        self.inner.write_file(entry, process)
    }
}

#[test]
fn interrupted_run_resumes_from_its_checkpoint() {
    let src = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    write_tree(
        src.path(),
        &[
            ("a.txt", b"first file"),
            ("b.txt", b"second file"),
            ("c.txt", b"third file"),
        ],
    );

    let cancel = CancelToken::new();
    let tripping = TrippingSource {
        inner: FilesystemSource::new(src.path()),
        cancel: cancel.clone(),
        trip_after: 1,
        reads: AtomicUsize::new(0),
    };
    let mut dest = FilesystemDestination::new(store.path());
    let pipeline = Pipeline::plaintext();

    let first = backup::run(BackupRequest {
        source: &tripping,
        destination: &mut dest,
        pipeline: &pipeline,
        backup_filter: filter::include_all(),
        compression_filter: filter::default_compression_filter(),
        chunk_size: 1024,
        progress_every_files: 0,
        progress_every_bytes: 0,
        force: false,
        cancel: &cancel,
        buffers: &BufferPool::new(4),
    })
    .unwrap();
    assert!(first.cancelled);
    assert_eq!(first.set_key, None);
    assert_eq!(first.files_recorded, 1);
    assert!(pipeline.read_pointer(&dest, keys::HEAD).unwrap().is_none());
    assert!(dest
        .exists(keys::PROGRESS, ReadOptions::FROM_LOCAL_CACHE)
        .unwrap());

    // The resumed run reuses the checkpointed file without re-reading.
    let source = FilesystemSource::new(src.path());
    let second = run_backup(&source, &mut dest, &pipeline, 1024);
    assert!(!second.cancelled);
    assert_eq!(second.files_reused, 1);
    assert_eq!(second.files_recorded, 2);

    let (_, set) = head_set(&dest, &pipeline);
    assert_eq!(set.entries.len(), 3);
    assert!(!dest
        .exists(keys::PROGRESS, ReadOptions::FROM_LOCAL_CACHE)
        .unwrap());
}

#[test]
fn report_quotes_awkward_paths() {
    let src = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    write_tree(src.path(), &[("weird, \"name\".txt", b"hello")]);

    let source = FilesystemSource::new(src.path());
    let mut dest = FilesystemDestination::new(store.path());
    let pipeline = Pipeline::plaintext();
    run_backup(&source, &mut dest, &pipeline, 1024);
    let (key, _) = head_set(&dest, &pipeline);

    let mut out = Vec::new();
    report::run(
        ReportRequest {
            destination: &mut dest,
            pipeline: &pipeline,
            entry_key: None,
            report_filter: filter::include_all(),
            include_sub_hashes: false,
            include_dupes: false,
        },
        &mut out,
    )
    .unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "EntryKey,Path,IsCompressed,FileSize,HashCount");
    assert_eq!(
        lines[1],
        format!("{key},\"weird, \"\"name\"\".txt\",false,5,1")
    );
}

#[test]
fn verify_flags_missing_and_altered_files() {
    let src = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    write_tree(
        src.path(),
        &[
            ("changed.txt", b"the original content"),
            ("keep.txt", b"untouched"),
            ("lost.txt", b"soon gone"),
        ],
    );

    let source = FilesystemSource::new(src.path());
    let mut dest = FilesystemDestination::new(store.path());
    let pipeline = Pipeline::plaintext();
    run_backup(&source, &mut dest, &pipeline, 1024);

    fs::write(src.path().join("changed.txt"), b"rewritten after backup").unwrap();
    fs::remove_file(src.path().join("lost.txt")).unwrap();

    let outcome = run_verify(&source, &mut dest, &pipeline);
    assert_eq!(
        outcome.issues,
        vec![
            RestoreIssue {
                path: "changed.txt".into(),
                kind: RestoreIssueKind::Invalid,
            },
            RestoreIssue {
                path: "lost.txt".into(),
                kind: RestoreIssueKind::Missing,
            },
        ]
    );
    assert_eq!(outcome.files_failed, 0);
}
