//! Mirrors one logical destination across several real ones.
//!
//! Writes are materialized once into a spool and replayed to the
//! primary and every secondary, so the write process runs exactly once
//! however many mirrors are attached. Reads are served by the primary
//! alone; deletes and flushes propagate everywhere.

use std::io::{Seek, SeekFrom};

use serde::{Deserialize, Serialize};

use crate::destination::{Destination, PartialReadDestination, ReadOptions, WriteOptions};
use crate::error::{CairnError, Result};
use crate::stream::{self, ReadProcess, WriteProcess};

/// Where a write spools its object body before replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpoolKind {
    /// Buffer in memory. Right choice for chunk-sized objects.
    #[default]
    Memory,
    /// Spool to an unlinked temp file; object bodies never occupy
    /// more than one buffer of memory at a time.
    Disk,
}

pub struct SplitDestination {
    primary: Box<dyn PartialReadDestination>,
    secondaries: Vec<Box<dyn Destination>>,
    spool: SpoolKind,
}

impl SplitDestination {
    pub fn new(
        primary: Box<dyn PartialReadDestination>,
        secondaries: Vec<Box<dyn Destination>>,
        spool: SpoolKind,
    ) -> Self {
        Self {
            primary,
            secondaries,
            spool,
        }
    }
}

impl Destination for SplitDestination {
    fn init(&mut self) -> Result<()> {
        self.primary.init()?;
        for secondary in &mut self.secondaries {
            secondary.init()?;
        }
        Ok(())
    }

    fn write(
        &mut self,
        key: &str,
        options: WriteOptions,
        process: WriteProcess<'_>,
    ) -> Result<bool> {
        match self.spool {
            SpoolKind::Memory => {
                let mut spool = Vec::new();
                process(&mut spool)?;
                let stored = self
                    .primary
                    .write(key, options, stream::write_bytes(&spool))?;
                for secondary in &mut self.secondaries {
                    secondary.write(key, options, stream::write_bytes(&spool))?;
                }
                Ok(stored)
            }
            SpoolKind::Disk => {
                let mut spool = tempfile::tempfile().map_err(CairnError::Io)?;
                process(&mut spool)?;
                spool.seek(SeekFrom::Start(0)).map_err(CairnError::Io)?;
                let stored = self
                    .primary
                    .write(key, options, stream::write_from_reader(&mut spool))?;
                for secondary in &mut self.secondaries {
                    spool.seek(SeekFrom::Start(0)).map_err(CairnError::Io)?;
                    secondary.write(key, options, stream::write_from_reader(&mut spool))?;
                }
                Ok(stored)
            }
        }
    }

    fn read(&self, key: &str, options: ReadOptions, process: ReadProcess<'_>) -> Result<bool> {
        self.primary.read(key, options, process)
    }

    fn exists(&self, key: &str, options: ReadOptions) -> Result<bool> {
        self.primary.exists(key, options)
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let removed = self.primary.delete(key)?;
        for secondary in &mut self.secondaries {
            secondary.delete(key)?;
        }
        Ok(removed)
    }

    fn flush(&mut self) -> Result<()> {
        self.primary.flush()?;
        for secondary in &mut self.secondaries {
            secondary.flush()?;
        }
        Ok(())
    }
}

impl PartialReadDestination for SplitDestination {
    fn read_range(
        &self,
        key: &str,
        begin: u64,
        end: u64,
        process: ReadProcess<'_>,
    ) -> Result<bool> {
        self.primary.read_range(key, begin, end, process)
    }
}
