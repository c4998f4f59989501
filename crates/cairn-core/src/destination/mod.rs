//! Storage destinations.
//!
//! A destination stores immutable objects under caller-chosen keys.
//! Content-addressed keys make writes idempotent: writing an existing
//! key without [`WriteOptions::OVERWRITE`] is a no-op. Missing data is
//! not an error at this layer; reads and deletes report it through
//! their `bool` result and callers decide whether that is fatal.

mod filesystem;
mod packed;
mod split;

pub use filesystem::FilesystemDestination;
pub use packed::{PackIndexEntry, PackPosition, PackedDestination, DEFAULT_PACK_SIZE};
pub use split::{SplitDestination, SpoolKind};

use std::ops::BitOr;

use crate::error::Result;
use crate::stream::{ReadProcess, WriteProcess};

/// Flags for [`Destination::write`]. Combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Keep the object individually addressable on the closest layer
    /// instead of letting an aggregating wrapper absorb it.
    pub cache_locally: bool,
    /// Replace an existing object. Without this, existing keys are
    /// left untouched.
    pub overwrite: bool,
}

impl WriteOptions {
    pub const NONE: WriteOptions = WriteOptions {
        cache_locally: false,
        overwrite: false,
    };
    pub const CACHE_LOCALLY: WriteOptions = WriteOptions {
        cache_locally: true,
        overwrite: false,
    };
    pub const OVERWRITE: WriteOptions = WriteOptions {
        cache_locally: false,
        overwrite: true,
    };
}

impl BitOr for WriteOptions {
    type Output = WriteOptions;

    fn bitor(self, rhs: WriteOptions) -> WriteOptions {
        WriteOptions {
            cache_locally: self.cache_locally || rhs.cache_locally,
            overwrite: self.overwrite || rhs.overwrite,
        }
    }
}

/// Flags for [`Destination::read`] and [`Destination::exists`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadOptions {
    /// Resolve the key on the closest layer only, bypassing any
    /// aggregating wrapper.
    pub from_local_cache: bool,
}

impl ReadOptions {
    pub const NONE: ReadOptions = ReadOptions {
        from_local_cache: false,
    };
    pub const FROM_LOCAL_CACHE: ReadOptions = ReadOptions {
        from_local_cache: true,
    };
}

/// Object store for backup data.
///
/// Implementations stream object bodies through the caller's process
/// closures; nothing here assumes bodies fit in memory.
pub trait Destination: Send {
    /// Prepare the destination for use. Called once before the first
    /// write or read.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Store an object. When the key already exists and `overwrite` is
    /// not set, returns `Ok(false)` without invoking `process`.
    fn write(&mut self, key: &str, options: WriteOptions, process: WriteProcess<'_>)
        -> Result<bool>;

    /// Stream an object's bytes into `process`. Returns `Ok(false)`
    /// when the key is absent; `process` is not invoked.
    fn read(&self, key: &str, options: ReadOptions, process: ReadProcess<'_>) -> Result<bool>;

    fn exists(&self, key: &str, options: ReadOptions) -> Result<bool>;

    /// Remove an object. Returns `Ok(false)` when nothing was there.
    fn delete(&mut self, key: &str) -> Result<bool>;

    /// Push any buffered state out. Called at the end of a run.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Destination + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Destination")
    }
}

/// Destination that can serve byte ranges of stored objects, which is
/// what lets packed chunks come back without fetching the whole pack.
pub trait PartialReadDestination: Destination {
    /// Stream bytes `begin..end` (half-open) of the object into
    /// `process`. Returns `Ok(false)` when the key is absent; a range
    /// that overruns an existing object fails with
    /// [`CairnError::InvalidRange`](crate::error::CairnError::InvalidRange).
    fn read_range(
        &self,
        key: &str,
        begin: u64,
        end: u64,
        process: ReadProcess<'_>,
    ) -> Result<bool>;
}
