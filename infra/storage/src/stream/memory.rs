use crate::stream::{Stream, unsupported};
use std::io::{self, SeekFrom};

/// An in-memory byte buffer with a cursor.
///
/// Growable by default. A fixed-capacity stream is a zeroed buffer of that many bytes
/// that can be overwritten but never grows, so writes past its end come up short. A
/// read-only stream rejects writes entirely.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    data: Vec<u8>,
    position: usize,
    capacity: Option<usize>,
    writable: bool,
    closed: bool,
}

impl MemoryStream {
    /// An empty, growable, writable stream.
    #[must_use]
    pub const fn new() -> Self {
        Self { data: Vec::new(), position: 0, capacity: None, writable: true, closed: false }
    }

    /// Writable stream over a copy of `bytes`, positioned at the start.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { data: bytes.to_vec(), ..Self::new() }
    }

    /// Read-only stream over `bytes`.
    #[must_use]
    pub fn read_only(bytes: Vec<u8>) -> Self {
        Self { data: bytes, writable: false, ..Self::new() }
    }

    /// A writable stream over `capacity` zeroed bytes that never grows.
    #[must_use]
    pub fn with_fixed_capacity(capacity: usize) -> Self {
        Self { data: vec![0; capacity], capacity: Some(capacity), ..Self::new() }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream is closed"))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream for MemoryStream {
    fn can_read(&self) -> bool {
        !self.closed
    }

    fn can_write(&self) -> bool {
        self.writable && !self.closed
    }

    fn can_seek(&self) -> bool {
        !self.closed
    }

    fn len(&self) -> Option<u64> {
        u64::try_from(self.data.len()).ok()
    }

    fn position(&self) -> u64 {
        u64::try_from(self.position).unwrap_or(u64::MAX)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        let available = self.data.get(self.position..).unwrap_or_default();
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;
        if !self.writable {
            return Err(unsupported("stream is read-only"));
        }
        let end = match self.capacity {
            Some(capacity) => self.position.saturating_add(buf.len()).min(capacity),
            None => self.position.saturating_add(buf.len()),
        };
        let n = end.saturating_sub(self.position);
        if n == 0 {
            return Ok(0);
        }
        if self.data.len() < self.position {
            self.data.resize(self.position, 0);
        }
        let overlap = self.data.len().min(end) - self.position.min(self.data.len());
        self.data[self.position..self.position + overlap].copy_from_slice(&buf[..overlap]);
        self.data.extend_from_slice(&buf[overlap..n]);
        self.position = end;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.ensure_open()?;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len().and_then(|len| len.checked_add_signed(delta)),
            SeekFrom::Current(delta) => self.position().checked_add_signed(delta),
        }
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before the start of the stream")
        })?;
        self.position = usize::try_from(target)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek target too large"))?;
        Ok(target)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.ensure_open()?;
        if !self.writable {
            return Err(unsupported("stream is read-only"));
        }
        let len = usize::try_from(len)
            .ok()
            .filter(|len| self.capacity.is_none_or(|capacity| *len <= capacity))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds capacity"))?;
        self.data.resize(len, 0);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_then_extend() {
        let mut stream = MemoryStream::from_bytes(b"abcdef");
        stream.seek(SeekFrom::Start(4)).unwrap();
        assert_eq!(stream.write(b"XYZ").unwrap(), 3);
        assert_eq!(stream.as_slice(), b"abcdXYZ");
        assert_eq!(stream.position(), 7);
    }

    #[test]
    fn fixed_capacity_writes_short() {
        let mut stream = MemoryStream::with_fixed_capacity(4);
        assert_eq!(stream.len(), Some(4));
        assert_eq!(stream.write(b"abcdef").unwrap(), 4);
        assert_eq!(stream.write(b"g").unwrap(), 0);
        assert_eq!(stream.as_slice(), b"abcd");
        stream.seek(SeekFrom::Start(1)).unwrap();
        assert_eq!(stream.write(b"ZZZZ").unwrap(), 3);
        assert_eq!(stream.as_slice(), b"aZZZ");
    }

    #[test]
    fn read_only_rejects_writes() {
        let mut stream = MemoryStream::read_only(b"data".to_vec());
        assert!(!stream.can_write());
        assert_eq!(stream.write(b"x").unwrap_err().kind(), io::ErrorKind::Unsupported);
        let mut buf = [0; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn seeking_past_end_pads_on_write() {
        let mut stream = MemoryStream::new();
        stream.seek(SeekFrom::Start(3)).unwrap();
        stream.write(b"z").unwrap();
        assert_eq!(stream.as_slice(), b"\0\0\0z");
        assert!(stream.seek(SeekFrom::Current(-10)).is_err());
    }
}
