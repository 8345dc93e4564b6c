//! Input stream collaborators.
//!
//! The loader pulls a module through a [`Stream`]: absolute seeks plus
//! blocking reads. A read that returns fewer bytes than asked for is treated
//! as a hard error by the caller.

use std::io::{Read, Seek, SeekFrom};

/// Source of DOFF bytes.
pub trait Stream {
    /// Move to absolute byte offset `pos`. Returns `false` when the position
    /// cannot be reached.
    fn set_file_position(&mut self, pos: u32) -> bool;

    /// Fill as much of `buf` as possible and return the number of bytes read.
    fn read_buffer(&mut self, buf: &mut [u8]) -> usize;
}

impl<S: Stream + ?Sized> Stream for &mut S {
    fn set_file_position(&mut self, pos: u32) -> bool {
        (**self).set_file_position(pos)
    }

    fn read_buffer(&mut self, buf: &mut [u8]) -> usize {
        (**self).read_buffer(buf)
    }
}

/// Stream over an in-memory image, such as a memory-mapped file.
#[derive(Debug, Clone)]
pub struct MemoryStream<'a> {
    base: &'a [u8],
    cur: usize,
}

impl<'a> MemoryStream<'a> {
    pub fn new(base: &'a [u8]) -> Self {
        Self { base, cur: 0 }
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.cur
    }
}

impl Stream for MemoryStream<'_> {
    fn set_file_position(&mut self, pos: u32) -> bool {
        let pos = pos as usize;
        if pos > self.base.len() {
            return false;
        }
        self.cur = pos;
        true
    }

    fn read_buffer(&mut self, buf: &mut [u8]) -> usize {
        let avail = &self.base[self.cur..];
        let n = buf.len().min(avail.len());
        buf[..n].copy_from_slice(&avail[..n]);
        self.cur += n;
        n
    }
}

/// Stream over any seekable reader.
#[derive(Debug)]
pub struct IoStream<R> {
    inner: R,
}

impl<R: Read + Seek> IoStream<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Stream for IoStream<R> {
    fn set_file_position(&mut self, pos: u32) -> bool {
        match self.inner.seek(SeekFrom::Start(u64::from(pos))) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("seek to {:#x} failed: {}", pos, e);
                false
            }
        }
    }

    fn read_buffer(&mut self, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!("read failed after {} bytes: {}", filled, e);
                    break;
                }
            }
        }
        filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn memory_stream_short_read_at_end() {
        let data = [1u8, 2, 3, 4, 5];
        let mut s = MemoryStream::new(&data);
        assert!(s.set_file_position(3));
        let mut buf = [0u8; 4];
        assert_eq!(s.read_buffer(&mut buf), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert!(!s.set_file_position(6));
        assert!(s.set_file_position(5));
        assert_eq!(s.read_buffer(&mut buf), 0);
    }

    #[test]
    fn io_stream_matches_memory_stream() {
        let data: Vec<u8> = (0..32).collect();
        let mut a = MemoryStream::new(&data);
        let mut b = IoStream::new(Cursor::new(data.clone()));
        for pos in [0u32, 7, 31] {
            assert!(a.set_file_position(pos));
            assert!(b.set_file_position(pos));
            let (mut x, mut y) = ([0u8; 8], [0u8; 8]);
            assert_eq!(a.read_buffer(&mut x), b.read_buffer(&mut y));
            assert_eq!(x, y);
        }
    }

    #[test]
    fn forwarding_through_mut_ref() {
        let data = [9u8; 4];
        let mut s = MemoryStream::new(&data);
        let mut r = &mut s;
        let mut buf = [0u8; 4];
        assert_eq!(Stream::read_buffer(&mut r, &mut buf), 4);
        assert_eq!(s.position(), 4);
    }
}
