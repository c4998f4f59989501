//! Local directory destination.
//!
//! Objects live at `<base>/<2-char key prefix>/<key>`, fanned out so a
//! large repository never piles every object into one directory.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use tempfile::NamedTempFile;

use crate::destination::{Destination, PartialReadDestination, ReadOptions, WriteOptions};
use crate::error::{CairnError, Result};
use crate::stream::{ReadProcess, WriteProcess};

pub struct FilesystemDestination {
    root: PathBuf,
}

impl FilesystemDestination {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Keys are digests or pointer names; anything else is rejected so
    /// a malformed key can never escape the root directory.
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if key.len() < 2 || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CairnError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(&key[..2]).join(key))
    }

    fn open(&self, key: &str) -> Result<Option<File>> {
        let path = self.object_path(key)?;
        match File::open(&path) {
            Ok(file) => Ok(Some(file)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CairnError::with_path(&path.to_string_lossy(), err)),
        }
    }
}

impl Destination for FilesystemDestination {
    fn init(&mut self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| CairnError::with_path(&self.root.to_string_lossy(), e))?;
        Ok(())
    }

    fn write(
        &mut self,
        key: &str,
        options: WriteOptions,
        process: WriteProcess<'_>,
    ) -> Result<bool> {
        let path = self.object_path(key)?;
        if !options.overwrite && path.exists() {
            return Ok(false);
        }

        // Stage in the target directory and rename into place, so
        // readers never observe a partially written object.
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)
            .map_err(|e| CairnError::with_path(&parent.to_string_lossy(), e))?;
        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|e| CairnError::with_path(&parent.to_string_lossy(), e))?;
        process(&mut tmp)?;
        tmp.persist(&path)
            .map_err(|e| CairnError::with_path(&path.to_string_lossy(), e.error))?;
        Ok(true)
    }

    fn read(&self, key: &str, _options: ReadOptions, process: ReadProcess<'_>) -> Result<bool> {
        match self.open(key)? {
            Some(mut file) => {
                process(&mut file)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn exists(&self, key: &str, _options: ReadOptions) -> Result<bool> {
        let path = self.object_path(key)?;
        match fs::metadata(&path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(CairnError::with_path(&path.to_string_lossy(), err)),
        }
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(CairnError::with_path(&path.to_string_lossy(), err)),
        }
    }
}

impl PartialReadDestination for FilesystemDestination {
    fn read_range(
        &self,
        key: &str,
        begin: u64,
        end: u64,
        process: ReadProcess<'_>,
    ) -> Result<bool> {
        let mut file = match self.open(key)? {
            Some(file) => file,
            None => return Ok(false),
        };
        let len = file
            .metadata()
            .map_err(|e| CairnError::with_path(key, e))?
            .len();
        if begin > end || end > len {
            return Err(CairnError::InvalidRange {
                key: key.to_string(),
                begin,
                end,
            });
        }
        file.seek(SeekFrom::Start(begin))
            .map_err(|e| CairnError::with_path(key, e))?;
        let mut window = file.take(end - begin);
        process(&mut window)?;
        Ok(true)
    }
}
