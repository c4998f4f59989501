//! Pack aggregation over a range-capable destination.
//!
//! Small content objects are appended to a scratch file and shipped as
//! one pack blob once the size threshold is crossed. Each flush also
//! stores a `PackIndexEntry` mapping object keys to byte ranges inside
//! the blob and points `packhead` at it; entries link to their
//! predecessor, so the full index is recoverable by walking the chain.
//! Reads resolve keys through the in-memory chain, newest entry first,
//! and fetch only the recorded byte range from the underlying store.
//!
//! Objects written `cache_locally` bypass packing entirely and stay
//! individually addressable below; `from_local_cache` reads mirror
//! that on the way out. The aggregator sits below the stream pipeline
//! and never transforms its own metadata.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::destination::{Destination, PartialReadDestination, ReadOptions, WriteOptions};
use crate::error::{CairnError, Result};
use crate::hash;
use crate::keys;
use crate::stream::{self, ReadProcess, WriteProcess};

/// Default pack-size threshold: 500 MiB.
pub const DEFAULT_PACK_SIZE: u64 = 500 * 1024 * 1024;

/// Byte range of one object inside a pack blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackPosition {
    pub key: String,
    pub offset: u64,
    pub length: u64,
}

/// One generation of the pack index. `parent_key` is the storage key
/// of the previous generation's entry, `None` for the oldest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackIndexEntry {
    pub parent_key: Option<String>,
    pub pack_key: String,
    pub positions: Vec<PackPosition>,
}

struct ChainLink {
    /// Storage key of the index entry itself.
    key: String,
    entry: PackIndexEntry,
}

struct PendingPack {
    scratch: NamedTempFile,
    positions: Vec<PackPosition>,
    size: u64,
}

struct PackCache {
    dir: Option<PathBuf>,
    blobs: Mutex<LruCache<String, NamedTempFile>>,
}

pub struct PackedDestination {
    inner: Box<dyn PartialReadDestination>,
    pack_size: u64,
    chain: Vec<ChainLink>,
    pending: Option<PendingPack>,
    cache: Option<PackCache>,
}

impl PackedDestination {
    pub fn new(inner: Box<dyn PartialReadDestination>, pack_size: u64) -> Self {
        Self {
            inner,
            pack_size,
            chain: Vec::new(),
            pending: None,
            cache: None,
        }
    }

    /// Keep up to `capacity` fully fetched pack blobs as local files
    /// and serve range reads from them. Evicted blobs are deleted.
    pub fn with_pack_cache(mut self, capacity: NonZeroUsize, dir: Option<PathBuf>) -> Self {
        self.cache = Some(PackCache {
            dir,
            blobs: Mutex::new(LruCache::new(capacity)),
        });
        self
    }

    fn read_inner_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let found = self.inner.read(
            key,
            ReadOptions::FROM_LOCAL_CACHE,
            stream::read_to_vec(&mut buf),
        )?;
        Ok(found.then_some(buf))
    }

    fn chain_position(&self, key: &str) -> Option<(&str, &PackPosition)> {
        for link in &self.chain {
            // Later appends within one pack shadow earlier ones.
            if let Some(pos) = link.entry.positions.iter().rev().find(|p| p.key == key) {
                return Some((link.entry.pack_key.as_str(), pos));
            }
        }
        None
    }

    fn contains(&self, key: &str) -> bool {
        if let Some(pending) = &self.pending {
            if pending.positions.iter().any(|p| p.key == key) {
                return true;
            }
        }
        self.chain_position(key).is_some()
    }

    /// Fetches the whole pack blob into the cache on a miss and hands
    /// back an independent handle to the cached copy.
    fn cached_pack_handle(&self, cache: &PackCache, pack_key: &str) -> Result<Option<File>> {
        let mut blobs = cache.blobs.lock().unwrap();
        if let Some(blob) = blobs.get(pack_key) {
            return Ok(Some(blob.reopen().map_err(CairnError::Io)?));
        }
        let mut fetched = match &cache.dir {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(CairnError::Io)?;
        let found = self.inner.read(
            pack_key,
            ReadOptions::NONE,
            stream::read_into_writer(&mut fetched),
        )?;
        if !found {
            return Ok(None);
        }
        debug!(pack = %pack_key, "cached pack blob locally");
        let handle = fetched.reopen().map_err(CairnError::Io)?;
        // Eviction drops the temp file, which deletes it.
        blobs.push(pack_key.to_string(), fetched);
        Ok(Some(handle))
    }

    fn read_packed(
        &self,
        pack_key: &str,
        position: &PackPosition,
        process: ReadProcess<'_>,
    ) -> Result<bool> {
        let begin = position.offset;
        let end = position.offset + position.length;
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return self.inner.read_range(pack_key, begin, end, process),
        };
        let mut file = match self.cached_pack_handle(cache, pack_key)? {
            Some(file) => file,
            None => return Ok(false),
        };
        file.seek(SeekFrom::Start(begin)).map_err(CairnError::Io)?;
        let mut window = file.take(position.length);
        process(&mut window)?;
        Ok(true)
    }

    /// Seals the pending scratch file into a pack blob plus an index
    /// entry, and repoints `packhead`.
    fn flush_pack(&mut self) -> Result<()> {
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => return Ok(()),
        };
        if pending.positions.is_empty() {
            return Ok(());
        }

        let mut scratch = pending.scratch.reopen().map_err(CairnError::Io)?;
        let pack_key = hash::digest_reader(&mut scratch)?;
        scratch.seek(SeekFrom::Start(0)).map_err(CairnError::Io)?;
        self.inner.write(
            &pack_key,
            WriteOptions::NONE,
            stream::write_from_reader(&mut scratch),
        )?;

        let entry = PackIndexEntry {
            parent_key: self.chain.first().map(|link| link.key.clone()),
            pack_key,
            positions: pending.positions,
        };
        let bytes = rmp_serde::to_vec(&entry)?;
        let index_key = hash::digest_bytes(&bytes);
        self.inner.write(
            &index_key,
            WriteOptions::CACHE_LOCALLY,
            stream::write_bytes(&bytes),
        )?;
        self.inner.write(
            keys::PACK_HEAD,
            WriteOptions::CACHE_LOCALLY | WriteOptions::OVERWRITE,
            stream::write_bytes(index_key.as_bytes()),
        )?;
        debug!(
            pack = %entry.pack_key,
            objects = entry.positions.len(),
            bytes = pending.size,
            "sealed pack"
        );
        self.chain.insert(
            0,
            ChainLink {
                key: index_key,
                entry,
            },
        );
        Ok(())
    }
}

impl Destination for PackedDestination {
    /// Rebuilds the in-memory index by walking the `packhead` chain.
    fn init(&mut self) -> Result<()> {
        self.inner.init()?;
        self.chain.clear();
        let mut next = match self.read_inner_bytes(keys::PACK_HEAD)? {
            Some(bytes) => Some(String::from_utf8(bytes).map_err(|_| {
                CairnError::InvalidFormat("packhead is not a valid key string".to_string())
            })?),
            None => None,
        };
        while let Some(key) = next {
            let bytes = self
                .read_inner_bytes(&key)?
                .ok_or_else(|| CairnError::MissingObject(key.clone()))?;
            let entry: PackIndexEntry = rmp_serde::from_slice(&bytes)?;
            next = entry.parent_key.clone();
            self.chain.push(ChainLink { key, entry });
        }
        debug!(generations = self.chain.len(), "pack index loaded");
        Ok(())
    }

    fn write(
        &mut self,
        key: &str,
        options: WriteOptions,
        process: WriteProcess<'_>,
    ) -> Result<bool> {
        if options.cache_locally {
            return self.inner.write(key, options, process);
        }
        if !options.overwrite && self.contains(key) {
            return Ok(false);
        }

        // Held out of self while appending so a failed append can be
        // rolled back before anything sees the torn bytes.
        let mut pending = match self.pending.take() {
            Some(pending) => pending,
            None => PendingPack {
                scratch: NamedTempFile::new().map_err(CairnError::Io)?,
                positions: Vec::new(),
                size: 0,
            },
        };
        let offset = pending.size;
        if let Err(err) = process(pending.scratch.as_file_mut()) {
            // Truncate back to the last good append; earlier objects in
            // the pending pack stay readable. A scratch that cannot be
            // rolled back is abandoned wholesale.
            let file = pending.scratch.as_file_mut();
            if file.set_len(offset).is_ok() && file.seek(SeekFrom::Start(offset)).is_ok() {
                self.pending = Some(pending);
            }
            return Err(err);
        }
        let end = pending
            .scratch
            .as_file()
            .metadata()
            .map_err(CairnError::Io)?
            .len();
        pending.positions.push(PackPosition {
            key: key.to_string(),
            offset,
            length: end - offset,
        });
        pending.size = end;
        self.pending = Some(pending);

        if end >= self.pack_size {
            self.flush_pack()?;
        }
        Ok(true)
    }

    fn read(&self, key: &str, options: ReadOptions, process: ReadProcess<'_>) -> Result<bool> {
        if options.from_local_cache {
            return self.inner.read(key, options, process);
        }
        if let Some(pending) = &self.pending {
            if let Some(position) = pending.positions.iter().rev().find(|p| p.key == key) {
                let mut file = pending.scratch.reopen().map_err(CairnError::Io)?;
                file.seek(SeekFrom::Start(position.offset))
                    .map_err(CairnError::Io)?;
                let mut window = file.take(position.length);
                process(&mut window)?;
                return Ok(true);
            }
        }
        if let Some((pack_key, position)) = self.chain_position(key) {
            return self.read_packed(pack_key, position, process);
        }
        // Not packed; the object may predate packing or live below.
        self.inner.read(key, options, process)
    }

    fn exists(&self, key: &str, options: ReadOptions) -> Result<bool> {
        // Pointer keys are never packed and live on the layer below.
        if options.from_local_cache || matches!(key, keys::HEAD | keys::PROGRESS | keys::PACK_HEAD)
        {
            return self.inner.exists(key, options);
        }
        Ok(self.contains(key))
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        self.inner.delete(key)
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_pack()?;
        self.inner.flush()
    }
}
