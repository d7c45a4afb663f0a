//! Stream adapters
//!
//! Wrap ordinary Rust byte sources as `MediaStream`s for custom protocols.

use crate::engine::MediaStream;
use std::io::{self, Read, Seek, SeekFrom};

/// Seekable stream over any `Read + Seek` source (files, cursors)
pub struct ReadSeekStream<T> {
    inner: T,
    size: Option<u64>,
}

impl<T: Read + Seek + Send> ReadSeekStream<T> {
    pub fn new(inner: T) -> Self {
        Self { inner, size: None }
    }

    /// Report a known total size instead of probing for it
    pub fn with_size(inner: T, size: u64) -> Self {
        Self {
            inner,
            size: Some(size),
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Seek + Send> MediaStream for ReadSeekStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        self.inner.seek(SeekFrom::Start(offset))
    }

    fn size(&mut self) -> Option<u64> {
        if self.size.is_none() {
            let pos = self.inner.stream_position().ok()?;
            let end = self.inner.seek(SeekFrom::End(0)).ok()?;
            self.inner.seek(SeekFrom::Start(pos)).ok()?;
            self.size = Some(end);
        }
        self.size
    }
}

/// Forward-only stream fed by an iterator of chunks
///
/// Seeking is only supported to the current position, which lets the engine
/// rewind a stream that has not been read yet.
pub struct ChunkStream<I> {
    chunks: I,
    pending: Vec<u8>,
    offset: usize,
    position: u64,
    finished: bool,
}

impl<I: Iterator<Item = Vec<u8>> + Send> ChunkStream<I> {
    pub fn new<C>(chunks: C) -> Self
    where
        C: IntoIterator<IntoIter = I>,
    {
        Self {
            chunks: chunks.into_iter(),
            pending: Vec::new(),
            offset: 0,
            position: 0,
            finished: false,
        }
    }
}

impl<I: Iterator<Item = Vec<u8>> + Send> MediaStream for ChunkStream<I> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.offset >= self.pending.len() {
            if self.finished {
                return Ok(0);
            }
            match self.chunks.next() {
                Some(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                None => self.finished = true,
            }
        }

        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        if offset == self.position {
            Ok(offset)
        } else {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "chunk streams only seek to the current position",
            ))
        }
    }

    fn close(&mut self) {
        self.finished = true;
        self.pending.clear();
        self.offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(stream: &mut dyn MediaStream) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn test_read_seek_stream_size_and_rewind() {
        let mut stream = ReadSeekStream::new(Cursor::new(b"hello world".to_vec()));
        assert_eq!(stream.size(), Some(11));
        assert_eq!(read_all(&mut stream), b"hello world");
        assert_eq!(stream.seek(6).unwrap(), 6);
        assert_eq!(read_all(&mut stream), b"world");
    }

    #[test]
    fn test_chunk_stream_concatenates_and_skips_empty_chunks() {
        let chunks = vec![b"ab".to_vec(), Vec::new(), b"cdef".to_vec()];
        let mut stream = ChunkStream::new(chunks);
        assert_eq!(stream.seek(0).unwrap(), 0);
        assert_eq!(read_all(&mut stream), b"abcdef");
        assert!(stream.seek(0).is_err());
        assert_eq!(stream.size(), None);
    }
}
