//! Streaming authenticated encryption.
//!
//! Wire format: an unencrypted header `[iv_len: u32 LE][base IV]` with
//! a fresh random 12-byte base IV per object, then the plaintext in
//! 64 KiB segments. Segment `i` is sealed with AES-256-GCM under a
//! nonce derived by XORing the big-endian counter into the trailing
//! four IV bytes, and framed as `[ct_len: u32 LE][ciphertext || tag]`.
//! A sealed empty segment terminates the stream, so truncation is
//! detected even on a segment boundary. Reordered or modified frames
//! fail authentication because the counter rides in the nonce.

use std::io::{self, Read, Write};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CairnError, Result};
use crate::stream::{ReadProcess, WriteProcess};

pub const KEY_LEN: usize = 32;

const IV_LEN: usize = 12;
const SEGMENT_SIZE: usize = 64 * 1024;
const TAG_LEN: usize = 16;
const DECRYPT_ERR: &str = "ciphertext authentication failed";

/// 256-bit key, zeroized on drop. Renders as base64 for transport on
/// the command line and in environment variables.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = Zeroizing::new(
            BASE64_STANDARD
                .decode(encoded.trim())
                .map_err(|_| CairnError::InvalidEncryptionKey("not valid base64".to_string()))?,
        );
        if raw.len() != KEY_LEN {
            return Err(CairnError::InvalidEncryptionKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                raw.len()
            )));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&raw);
        Ok(Self { bytes })
    }

    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.bytes)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.bytes))
    }
}

/// Wraps a write process so its plaintext lands encrypted.
pub(crate) fn encrypt_into<'a>(
    key: &'a EncryptionKey,
    process: WriteProcess<'a>,
) -> WriteProcess<'a> {
    Box::new(move |w: &mut dyn Write| {
        let mut writer = SegmentWriter::new(key, &mut *w)?;
        process(&mut writer)?;
        writer.finalize()
    })
}

/// Wraps a read process so it sees decrypted plaintext.
pub(crate) fn decrypt_from<'a>(
    key: &'a EncryptionKey,
    process: ReadProcess<'a>,
) -> ReadProcess<'a> {
    Box::new(move |r: &mut dyn Read| {
        let mut reader = SegmentReader::new(key, &mut *r)?;
        process(&mut reader).map_err(remap_decrypt_error)
    })
}

/// Authentication failures travel through inner readers as io errors;
/// surface them as the typed variant.
fn remap_decrypt_error(err: CairnError) -> CairnError {
    match &err {
        CairnError::Io(io_err)
            if io_err.kind() == io::ErrorKind::InvalidData && io_err.to_string() == DECRYPT_ERR =>
        {
            CairnError::DecryptionFailed
        }
        _ => err,
    }
}

fn nonce_for(base_iv: &[u8; IV_LEN], counter: u32) -> [u8; IV_LEN] {
    let mut nonce = *base_iv;
    for (byte, ctr) in nonce[IV_LEN - 4..].iter_mut().zip(counter.to_be_bytes()) {
        *byte ^= ctr;
    }
    nonce
}

/// Write half of the segmented stream. Plaintext accumulates into
/// segments; [`finalize`](SegmentWriter::finalize) seals the trailing
/// partial segment and the empty terminator, and without it the stream
/// reads back as truncated.
struct SegmentWriter<W: Write> {
    inner: W,
    cipher: Aes256Gcm,
    base_iv: [u8; IV_LEN],
    counter: u32,
    buf: Vec<u8>,
}

impl<W: Write> SegmentWriter<W> {
    fn new(key: &EncryptionKey, mut inner: W) -> Result<Self> {
        let mut base_iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut base_iv);
        inner.write_all(&(IV_LEN as u32).to_le_bytes())?;
        inner.write_all(&base_iv)?;
        Ok(Self {
            inner,
            cipher: key.cipher(),
            base_iv,
            counter: 0,
            buf: Vec::with_capacity(SEGMENT_SIZE),
        })
    }

    fn emit_segment(&mut self) -> io::Result<()> {
        let nonce = nonce_for(&self.base_iv, self.counter);
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| io::Error::other("segment counter overflow"))?;
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), self.buf.as_slice())
            .map_err(|_| io::Error::other("encryption failure"))?;
        self.inner.write_all(&(sealed.len() as u32).to_le_bytes())?;
        self.inner.write_all(&sealed)?;
        self.buf.clear();
        Ok(())
    }

    fn finalize(mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.emit_segment()?;
        }
        // Terminator: a sealed empty segment. Authenticated, so a cut
        // on a segment boundary cannot pass for end-of-stream.
        self.emit_segment()?;
        self.inner.flush()?;
        Ok(())
    }
}

impl<W: Write> Write for SegmentWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let space = SEGMENT_SIZE - self.buf.len();
        let take = space.min(data.len());
        self.buf.extend_from_slice(&data[..take]);
        if self.buf.len() == SEGMENT_SIZE {
            self.emit_segment()?;
        }
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Read half. Unseals frames on demand and fails on truncation,
/// tampering, or a wrong key.
struct SegmentReader<R: Read> {
    inner: R,
    cipher: Aes256Gcm,
    base_iv: [u8; IV_LEN],
    counter: u32,
    buf: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> SegmentReader<R> {
    fn new(key: &EncryptionKey, mut inner: R) -> Result<Self> {
        let mut len_bytes = [0u8; 4];
        inner.read_exact(&mut len_bytes)?;
        let iv_len = u32::from_le_bytes(len_bytes) as usize;
        if iv_len != IV_LEN {
            return Err(CairnError::InvalidFormat(format!(
                "unexpected iv length {iv_len}"
            )));
        }
        let mut base_iv = [0u8; IV_LEN];
        inner.read_exact(&mut base_iv)?;
        Ok(Self {
            inner,
            cipher: key.cipher(),
            base_iv,
            counter: 0,
            buf: Vec::new(),
            pos: 0,
            done: false,
        })
    }

    fn next_frame(&mut self) -> io::Result<()> {
        let mut len_bytes = [0u8; 4];
        self.inner.read_exact(&mut len_bytes).map_err(truncated)?;
        let ct_len = u32::from_le_bytes(len_bytes) as usize;
        if !(TAG_LEN..=SEGMENT_SIZE + TAG_LEN).contains(&ct_len) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid ciphertext frame length",
            ));
        }
        let mut ciphertext = vec![0u8; ct_len];
        self.inner.read_exact(&mut ciphertext).map_err(truncated)?;

        let nonce = nonce_for(&self.base_iv, self.counter);
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| io::Error::other("segment counter overflow"))?;
        let opened = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, DECRYPT_ERR))?;

        self.done = opened.is_empty();
        self.buf = opened;
        self.pos = 0;
        Ok(())
    }
}

impl<R: Read> Read for SegmentReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.buf.len() {
                let n = out.len().min(self.buf.len() - self.pos);
                out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }
            self.next_frame()?;
        }
    }
}

fn truncated(err: io::Error) -> io::Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        io::Error::new(io::ErrorKind::InvalidData, "truncated ciphertext stream")
    } else {
        err
    }
}
