//! The handle's backing buffer, tagged by provenance.

use crate::{ObjectStream, Result};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use tracing::trace;

/// A fully seekable in-memory byte buffer. Writing past the end zero-fills
/// the gap; truncating does not move the cursor.
#[derive(Debug, Default)]
pub struct LocalBuffer {
    cursor: Cursor<Vec<u8>>,
}

impl LocalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }
}

impl Read for LocalBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for LocalBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.cursor.flush()
    }
}

impl Seek for LocalBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl ObjectStream for LocalBuffer {
    fn size(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    fn set_len(&mut self, new_size: u64) -> Result<()> {
        self.cursor.get_mut().resize(new_size as usize, 0);
        Ok(())
    }

    fn is_writable(&self) -> bool {
        true
    }
}

/// The buffer behind an open handle, tagged by who owns the bytes.
///
/// A `Borrowed` buffer is the stream the backend handed out, conceptually
/// still shared with the backend's own resources; it is copied in full into
/// an exclusive [`LocalBuffer`] before the first mutation. An `Owned` buffer
/// is the handle's alone and is mutated in place.
#[derive(Debug)]
pub enum HandleBuf {
    Borrowed(Box<dyn ObjectStream>),
    Owned(Box<dyn ObjectStream>),
}

impl HandleBuf {
    /// Wraps a backend stream, honoring its own claim of writability.
    pub(crate) fn from_backend(stream: Box<dyn ObjectStream>) -> Self {
        if stream.is_writable() {
            Self::Owned(stream)
        } else {
            Self::Borrowed(stream)
        }
    }

    pub(crate) fn empty() -> Self {
        Self::Owned(Box::new(LocalBuffer::new()))
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self, Self::Borrowed(_))
    }

    pub(crate) fn stream(&mut self) -> &mut dyn ObjectStream {
        match self {
            Self::Borrowed(stream) | Self::Owned(stream) => stream.as_mut(),
        }
    }

    pub(crate) fn stream_ref(&self) -> &dyn ObjectStream {
        match self {
            Self::Borrowed(stream) | Self::Owned(stream) => stream.as_ref(),
        }
    }

    /// Ensures the buffer is exclusively owned, copying the borrowed stream's
    /// full content into a private buffer while preserving the cursor. Every
    /// mutating operation calls this first.
    pub(crate) fn make_owned(&mut self) -> Result<()> {
        let Self::Borrowed(stream) = self else {
            return Ok(());
        };

        let pos = stream.stream_position()?;
        stream.seek(SeekFrom::Start(0))?;

        let mut data = Vec::new();
        stream.read_to_end(&mut data)?;
        trace!(bytes = data.len(), "copying borrowed stream before mutation");

        let mut local = LocalBuffer::from_vec(data);
        local.seek(SeekFrom::Start(pos))?;
        *self = Self::Owned(Box::new(local));

        Ok(())
    }
}
