use std::io::Read;
use std::sync::LazyLock;

use data_encoding::{Encoding, Specification};
use sha1::{Digest, Sha1};

use crate::error::Result;

/// z-base-32: no padding, no visually ambiguous characters, lower-case only.
/// A 20-byte SHA-1 digest encodes to exactly 32 characters, so keys are safe
/// as filesystem path components and object-store keys alike.
static ZBASE32: LazyLock<Encoding> = LazyLock::new(|| {
    let mut spec = Specification::new();
    spec.symbols.push_str("ybndrfg8ejkmcpqxot1uwisza345h769");
    spec.encoding().expect("valid z-base-32 specification")
});

const READ_BUF_SIZE: usize = 64 * 1024;

/// Content key for a byte slice.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    ZBASE32.encode(&hasher.finalize())
}

/// Content key for a byte stream, hashing incrementally.
pub fn digest_reader(reader: &mut dyn Read) -> Result<String> {
    let mut hasher = Sha1::new();
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(ZBASE32.encode(&hasher.finalize()))
}
