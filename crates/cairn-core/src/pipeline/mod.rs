//! Transform pipeline between the engines and a destination.
//!
//! Writes compose compression then encryption, reads invert the order.
//! Object keys are digests of the serialized bytes before the pipeline
//! touches them, so identical content maps to the same key however a
//! repository is configured and dedup keeps working across plaintext,
//! compressed, and encrypted stores.

mod compress;
mod encrypt;

pub use encrypt::{EncryptionKey, KEY_LEN};

use crate::destination::{Destination, ReadOptions, WriteOptions};
use crate::error::{CairnError, Result};
use crate::hash;
use crate::stream::{self, ReadProcess, WriteProcess};

/// Per-repository transform configuration. Compression is decided per
/// write; encryption applies to everything once a key is present.
#[derive(Default)]
pub struct Pipeline {
    key: Option<EncryptionKey>,
}

impl Pipeline {
    pub fn new(key: Option<EncryptionKey>) -> Self {
        Self { key }
    }

    /// No compression, no encryption.
    pub fn plaintext() -> Self {
        Self { key: None }
    }

    /// Layers the configured transforms over a write process.
    pub fn wrap_write<'a>(&'a self, compress: bool, process: WriteProcess<'a>) -> WriteProcess<'a> {
        let mut process = process;
        if compress {
            process = compress::compress_into(process);
        }
        if let Some(key) = &self.key {
            process = encrypt::encrypt_into(key, process);
        }
        process
    }

    /// Inverse of [`wrap_write`](Self::wrap_write); `compressed` must
    /// match how the object was written.
    pub fn wrap_read<'a>(&'a self, compressed: bool, process: ReadProcess<'a>) -> ReadProcess<'a> {
        let mut process = process;
        if compressed {
            process = compress::decompress_from(process);
        }
        if let Some(key) = &self.key {
            process = encrypt::decrypt_from(key, process);
        }
        process
    }

    pub fn write_object(
        &self,
        destination: &mut dyn Destination,
        key: &str,
        options: WriteOptions,
        compress: bool,
        bytes: &[u8],
    ) -> Result<bool> {
        destination.write(key, options, self.wrap_write(compress, stream::write_bytes(bytes)))
    }

    /// Content-addressed write: the key is the digest of `bytes` as
    /// given, before compression or encryption.
    pub fn hash_and_write(
        &self,
        destination: &mut dyn Destination,
        options: WriteOptions,
        compress: bool,
        bytes: &[u8],
    ) -> Result<String> {
        let key = hash::digest_bytes(bytes);
        self.write_object(destination, &key, options, compress, bytes)?;
        Ok(key)
    }

    /// Reads an object back through the inverse pipeline, or `None`
    /// when the key is absent.
    pub fn read_object(
        &self,
        destination: &dyn Destination,
        key: &str,
        options: ReadOptions,
        compressed: bool,
    ) -> Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let found =
            destination.read(key, options, self.wrap_read(compressed, stream::read_to_vec(&mut buf)))?;
        Ok(found.then_some(buf))
    }

    /// Overwrites a named pointer. Pointers are the only mutable keys;
    /// they are encrypted when a key is configured but never
    /// compressed, and always stay individually addressable.
    pub fn write_pointer(
        &self,
        destination: &mut dyn Destination,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.write_object(
            destination,
            name,
            WriteOptions::CACHE_LOCALLY | WriteOptions::OVERWRITE,
            false,
            value.as_bytes(),
        )?;
        Ok(())
    }

    pub fn read_pointer(&self, destination: &dyn Destination, name: &str) -> Result<Option<String>> {
        match self.read_object(destination, name, ReadOptions::FROM_LOCAL_CACHE, false)? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes).map_err(|_| {
                CairnError::InvalidFormat(format!("pointer {name} is not valid utf-8"))
            })?)),
            None => Ok(None),
        }
    }
}
