//! Gzip layer of the stream pipeline.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::stream::{ReadProcess, WriteProcess};

/// Wraps a write process so its output lands gzip-compressed.
pub(crate) fn compress_into(process: WriteProcess<'_>) -> WriteProcess<'_> {
    Box::new(move |w: &mut dyn Write| {
        let mut encoder = GzEncoder::new(&mut *w, Compression::default());
        process(&mut encoder)?;
        encoder.finish()?;
        Ok(())
    })
}

/// Wraps a read process so it sees decompressed bytes.
pub(crate) fn decompress_from(process: ReadProcess<'_>) -> ReadProcess<'_> {
    Box::new(move |r: &mut dyn Read| {
        let mut decoder = GzDecoder::new(&mut *r);
        process(&mut decoder)
    })
}
