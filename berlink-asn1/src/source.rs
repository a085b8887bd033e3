//! Byte sources feeding the codec readers.
//!
//! The codec reads from two kinds of places: an in-memory buffer whose end
//! is known up front, and a blocking stream that may simply run dry. The
//! two differ only in how exhaustion is reported, so a single trait serves
//! both and the readers are written once, generically.

use berlink_core::{BerlinkError, BerlinkResult};
use std::io::Read;

/// A positioned octet supplier.
///
/// Exhaustion semantics per implementation:
/// - [`SliceSource`] (buffer mode): any read past the end fails with
///   `Bounds`.
/// - [`StreamSource`] (stream mode): [`next_octet`](ByteSource::next_octet)
///   returns `Ok(None)` at EOF, which callers at a message boundary treat
///   as a clean end of input; bulk reads report a short count and the
///   caller decides which error that is.
pub trait ByteSource {
    /// Next octet, or `None` when a stream has nothing more to offer.
    fn next_octet(&mut self) -> BerlinkResult<Option<u8>>;

    /// Fill `buf` as far as possible and return the byte count delivered.
    fn read_exact(&mut self, buf: &mut [u8]) -> BerlinkResult<usize>;
}

/// Buffer-mode source over a byte slice with position tracking.
#[derive(Debug)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left in the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }
}

impl ByteSource for SliceSource<'_> {
    fn next_octet(&mut self) -> BerlinkResult<Option<u8>> {
        if self.position >= self.data.len() {
            return Err(BerlinkError::Bounds {
                offset: self.position,
                wanted: 1,
                len: self.data.len(),
            });
        }
        let octet = self.data[self.position];
        self.position += 1;
        Ok(Some(octet))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> BerlinkResult<usize> {
        if self.position + buf.len() > self.data.len() {
            return Err(BerlinkError::Bounds {
                offset: self.position,
                wanted: buf.len(),
                len: self.data.len(),
            });
        }
        buf.copy_from_slice(&self.data[self.position..self.position + buf.len()]);
        self.position += buf.len();
        Ok(buf.len())
    }
}

/// Stream-mode source over any blocking reader.
#[derive(Debug)]
pub struct StreamSource<R: Read> {
    inner: R,
}

impl<R: Read> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for StreamSource<R> {
    fn next_octet(&mut self) -> BerlinkResult<Option<u8>> {
        let mut octet = [0u8; 1];
        loop {
            match self.inner.read(&mut octet) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(octet[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> BerlinkResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}
