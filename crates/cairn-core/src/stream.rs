//! Process-stream callbacks: the unit of composition between engines,
//! pipeline decorators, and destinations.
//!
//! A write process produces bytes into a writer the callee supplies; a read
//! process drains a reader the callee supplies. Destinations own the outer
//! stream (a temp file, an object body), decorators wrap a process in
//! compression or encryption, and engines build the innermost process.

use std::io::{self, Read, Write};

use crate::error::Result;

/// Callback that writes an object's bytes into the supplied writer.
pub type WriteProcess<'a> = Box<dyn FnOnce(&mut dyn Write) -> Result<()> + 'a>;

/// Callback that consumes an object's bytes from the supplied reader.
pub type ReadProcess<'a> = Box<dyn FnOnce(&mut dyn Read) -> Result<()> + 'a>;

/// Write process emitting a byte slice.
pub fn write_bytes(data: &[u8]) -> WriteProcess<'_> {
    Box::new(move |w| {
        w.write_all(data)?;
        Ok(())
    })
}

/// Write process draining a reader into the destination stream.
pub fn write_from_reader<'a, R: Read + 'a>(mut reader: R) -> WriteProcess<'a> {
    Box::new(move |w| {
        io::copy(&mut reader, w)?;
        Ok(())
    })
}

/// Read process collecting the full stream into a buffer.
pub fn read_to_vec(buf: &mut Vec<u8>) -> ReadProcess<'_> {
    Box::new(move |r| {
        r.read_to_end(buf)?;
        Ok(())
    })
}

/// Read process copying the full stream into a writer.
pub fn read_into_writer<'a, W: Write + ?Sized>(writer: &'a mut W) -> ReadProcess<'a> {
    Box::new(move |r| {
        io::copy(r, &mut *writer)?;
        Ok(())
    })
}
