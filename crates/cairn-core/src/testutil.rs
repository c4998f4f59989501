//! In-memory doubles for exercising engines and wrappers without
//! touching disk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cancel::CancelToken;
use crate::destination::{Destination, PartialReadDestination, ReadOptions, WriteOptions};
use crate::entry::FileEntry;
use crate::error::{CairnError, Result};
use crate::source::Source;
use crate::stream::{ReadProcess, WriteProcess};

// ---- memory destination ----

#[derive(Default)]
pub(crate) struct MemoryDestination {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryDestination {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub(crate) fn insert(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

impl Destination for MemoryDestination {
    fn write(
        &mut self,
        key: &str,
        options: WriteOptions,
        process: WriteProcess<'_>,
    ) -> Result<bool> {
        if !options.overwrite && self.objects.lock().unwrap().contains_key(key) {
            return Ok(false);
        }
        let mut buf = Vec::new();
        process(&mut buf)?;
        self.objects.lock().unwrap().insert(key.to_string(), buf);
        Ok(true)
    }

    fn read(&self, key: &str, _options: ReadOptions, process: ReadProcess<'_>) -> Result<bool> {
        match self.get(key) {
            Some(bytes) => {
                process(&mut bytes.as_slice())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn exists(&self, key: &str, _options: ReadOptions) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().remove(key).is_some())
    }
}

impl PartialReadDestination for MemoryDestination {
    fn read_range(
        &self,
        key: &str,
        begin: u64,
        end: u64,
        process: ReadProcess<'_>,
    ) -> Result<bool> {
        let bytes = match self.get(key) {
            Some(bytes) => bytes,
            None => return Ok(false),
        };
        if begin > end || end > bytes.len() as u64 {
            return Err(CairnError::InvalidRange {
                key: key.to_string(),
                begin,
                end,
            });
        }
        process(&mut &bytes[begin as usize..end as usize])?;
        Ok(true)
    }
}

// ---- recording wrapper ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DestinationOp {
    Write {
        key: String,
        cache_locally: bool,
        overwrite: bool,
    },
    Read {
        key: String,
        from_local_cache: bool,
    },
    Exists {
        key: String,
        from_local_cache: bool,
    },
    Delete {
        key: String,
    },
    Flush,
}

/// Wrapper recording every call it forwards, for asserting which keys
/// a component touched and with which options.
pub(crate) struct RecordingDestination<D> {
    pub(crate) inner: D,
    ops: Arc<Mutex<Vec<DestinationOp>>>,
}

impl<D> RecordingDestination<D> {
    pub(crate) fn new(inner: D) -> Self {
        Self {
            inner,
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn ops(&self) -> Vec<DestinationOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Clone of the log handle, for keeping visibility after the
    /// wrapper is boxed into another destination.
    pub(crate) fn ops_handle(&self) -> Arc<Mutex<Vec<DestinationOp>>> {
        Arc::clone(&self.ops)
    }

    pub(crate) fn written_keys(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                DestinationOp::Write { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }
}

impl<D: Destination> Destination for RecordingDestination<D> {
    fn init(&mut self) -> Result<()> {
        self.inner.init()
    }

    fn write(
        &mut self,
        key: &str,
        options: WriteOptions,
        process: WriteProcess<'_>,
    ) -> Result<bool> {
        self.ops.lock().unwrap().push(DestinationOp::Write {
            key: key.to_string(),
            cache_locally: options.cache_locally,
            overwrite: options.overwrite,
        });
        self.inner.write(key, options, process)
    }

    fn read(&self, key: &str, options: ReadOptions, process: ReadProcess<'_>) -> Result<bool> {
        self.ops.lock().unwrap().push(DestinationOp::Read {
            key: key.to_string(),
            from_local_cache: options.from_local_cache,
        });
        self.inner.read(key, options, process)
    }

    fn exists(&self, key: &str, options: ReadOptions) -> Result<bool> {
        self.ops.lock().unwrap().push(DestinationOp::Exists {
            key: key.to_string(),
            from_local_cache: options.from_local_cache,
        });
        self.inner.exists(key, options)
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        self.ops
            .lock()
            .unwrap()
            .push(DestinationOp::Delete {
                key: key.to_string(),
            });
        self.inner.delete(key)
    }

    fn flush(&mut self) -> Result<()> {
        self.ops.lock().unwrap().push(DestinationOp::Flush);
        self.inner.flush()
    }
}

impl<D: PartialReadDestination> PartialReadDestination for RecordingDestination<D> {
    fn read_range(
        &self,
        key: &str,
        begin: u64,
        end: u64,
        process: ReadProcess<'_>,
    ) -> Result<bool> {
        self.inner.read_range(key, begin, end, process)
    }
}

// ---- memory source ----

/// Fixed set of files served from memory. Restores write into
/// `written`, reads land in `reads`; tests inspect both afterwards.
#[derive(Default)]
pub(crate) struct MemorySource {
    files: Vec<(FileEntry, Vec<u8>)>,
    written: Mutex<Vec<(FileEntry, Vec<u8>)>>,
    reads: Mutex<Vec<String>>,
}

impl MemorySource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_file(
        mut self,
        path: &str,
        created: i64,
        modified: i64,
        bytes: &[u8],
    ) -> Self {
        self.files.push((
            FileEntry {
                path: path.to_string(),
                created,
                modified,
                size: bytes.len() as u64,
                is_compressed: false,
                sub_hashes: Vec::new(),
            },
            bytes.to_vec(),
        ));
        self
    }

    pub(crate) fn written(&self) -> Vec<(FileEntry, Vec<u8>)> {
        self.written.lock().unwrap().clone()
    }

    pub(crate) fn read_paths(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }
}

impl Source for MemorySource {
    fn enumerate(
        &self,
        cancel: &CancelToken,
        on_file: &mut (dyn FnMut(FileEntry) -> Result<()> + Send),
    ) -> Result<()> {
        for (entry, _) in &self.files {
            if cancel.is_cancelled() {
                break;
            }
            on_file(entry.clone())?;
        }
        Ok(())
    }

    fn metadata(&self, path: &str) -> Result<Option<FileEntry>> {
        Ok(self
            .files
            .iter()
            .find(|(entry, _)| entry.path == path)
            .map(|(entry, _)| entry.clone()))
    }

    fn read_file(&self, path: &str, process: ReadProcess<'_>) -> Result<()> {
        self.reads.lock().unwrap().push(path.to_string());
        let bytes = self
            .files
            .iter()
            .find(|(entry, _)| entry.path == path)
            .map(|(_, bytes)| bytes)
            .ok_or_else(|| {
                CairnError::with_path(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                )
            })?;
        process(&mut bytes.as_slice())
    }

    fn write_file(&self, entry: &FileEntry, process: WriteProcess<'_>) -> Result<()> {
        let mut buf = Vec::new();
        process(&mut buf)?;
        self.written.lock().unwrap().push((entry.clone(), buf));
        Ok(())
    }
}
