use crate::error::StorageError;
use crate::stream::{SharedStream, Stream, check_distinct, unsupported};
use std::fmt;
use std::io::{self, SeekFrom};

/// Presents several backing streams as one contiguous, forward-only stream.
///
/// A single read or write may span several backing streams. Reads move on once the
/// current stream reports its end; writes move on once it takes a short write or
/// its position reaches its length. There is no
/// going back: seeking and resizing are unsupported.
///
/// ```rust
/// use depot_storage::stream::{ConcatenatedStream, MemoryStream, Stream, shared};
///
/// let mut joined = ConcatenatedStream::new(vec![
///     shared(MemoryStream::read_only(b"abc".to_vec())),
///     shared(MemoryStream::read_only(b"de".to_vec())),
/// ])
/// .unwrap();
///
/// let mut buf = [0u8; 4];
/// assert_eq!(joined.read(&mut buf).unwrap(), 4);
/// assert_eq!(&buf, b"abcd");
/// assert_eq!(joined.read(&mut buf).unwrap(), 1);
/// assert_eq!(joined.read(&mut buf).unwrap(), 0);
/// assert_eq!(joined.len(), Some(5));
/// ```
pub struct ConcatenatedStream {
    streams: Vec<SharedStream>,
    current: usize,
    position: u64,
    length: Option<u64>,
    readable: bool,
    writable: bool,
}

impl ConcatenatedStream {
    /// # Errors
    /// Returns [`StorageError::InvalidArgument`] when `streams` is empty, holds the same
    /// stream twice, shares no common capability (neither all readable nor all
    /// writable), or its total length overflows `u64`.
    pub fn new(streams: Vec<SharedStream>) -> Result<Self, StorageError> {
        check_distinct(&streams)?;

        let mut readable = true;
        let mut writable = true;
        let mut length = Some(0u64);
        for stream in &streams {
            let stream = stream.lock();
            readable &= stream.can_read();
            writable &= stream.can_write();
            length = match (length, stream.len()) {
                (Some(total), Some(len)) => Some(total.checked_add(len).ok_or_else(|| {
                    StorageError::invalid_argument("combined stream length overflows u64")
                })?),
                _ => None,
            };
        }

        if !readable && !writable {
            return Err(StorageError::invalid_argument(
                "backing streams must all be readable or all be writable",
            ));
        }

        Ok(Self { streams, current: 0, position: 0, length, readable, writable })
    }

    /// Index of the backing stream currently being serviced.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current
    }
}

impl fmt::Debug for ConcatenatedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcatenatedStream")
            .field("streams", &self.streams.len())
            .field("current", &self.current)
            .field("position", &self.position)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

impl Stream for ConcatenatedStream {
    fn can_read(&self) -> bool {
        self.readable
    }

    fn can_write(&self) -> bool {
        self.writable
    }

    fn len(&self) -> Option<u64> {
        self.length
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.readable {
            return Err(unsupported("backing streams are not all readable"));
        }
        let mut filled = 0;
        while filled < buf.len()
            && let Some(stream) = self.streams.get(self.current)
        {
            let mut stream = stream.lock();
            let n = if at_end(&*stream) {
                0
            } else {
                match stream.read(&mut buf[filled..]) {
                    Ok(n) => n,
                    // Bytes already copied out are reported; the error resurfaces next call.
                    Err(_) if filled > 0 => break,
                    Err(err) => return Err(err),
                }
            };
            filled += n;
            if n == 0 || at_end(&*stream) {
                self.current += 1;
            }
        }
        self.position += filled as u64;
        Ok(filled)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(unsupported("backing streams are not all writable"));
        }
        let mut written = 0;
        while written < buf.len()
            && let Some(stream) = self.streams.get(self.current)
        {
            let mut stream = stream.lock();
            let rest = &buf[written..];
            let n = match stream.write(rest) {
                Ok(n) => n,
                Err(_) if written > 0 => break,
                Err(err) => return Err(err),
            };
            written += n;
            if n < rest.len() || at_end(&*stream) {
                self.current += 1;
            }
        }
        self.position += written as u64;
        Ok(written)
    }

    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(unsupported("concatenated streams cannot seek"))
    }

    fn set_len(&mut self, _len: u64) -> io::Result<()> {
        Err(unsupported("concatenated streams cannot be resized"))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.streams.iter().try_for_each(|stream| stream.lock().flush())
    }
}

/// The stream reports its end: position at or past a known length.
fn at_end(stream: &dyn Stream) -> bool {
    stream.len().is_some_and(|len| stream.position() >= len)
}

impl io::Read for ConcatenatedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Stream::read(self, buf)
    }
}

impl io::Write for ConcatenatedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Stream::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Stream::flush(self)
    }
}

impl io::Seek for ConcatenatedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Stream::seek(self, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{MemoryStream, shared};
    use std::sync::Arc;

    fn readable(sizes: &[usize]) -> Vec<SharedStream> {
        let mut next = 0u8;
        sizes
            .iter()
            .map(|&size| {
                let bytes: Vec<u8> = (0..size)
                    .map(|_| {
                        next += 1;
                        next
                    })
                    .collect();
                shared(MemoryStream::read_only(bytes))
            })
            .collect()
    }

    #[test]
    fn reads_span_backing_streams() {
        let mut stream = ConcatenatedStream::new(readable(&[3, 5, 2])).unwrap();
        assert_eq!(stream.len(), Some(10));

        let mut buf = [0u8; 4];
        assert_eq!(Stream::read(&mut stream, &mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(Stream::read(&mut stream, &mut buf).unwrap(), 4);
        assert_eq!(buf, [5, 6, 7, 8]);
        assert_eq!(Stream::read(&mut stream, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], [9, 10]);
        assert_eq!(Stream::read(&mut stream, &mut buf).unwrap(), 0);
        assert_eq!(stream.position(), 10);
    }

    #[test]
    fn writes_fill_fixed_streams_in_order() {
        let first = shared(MemoryStream::with_fixed_capacity(2));
        let second = shared(MemoryStream::with_fixed_capacity(3));
        let mut stream =
            ConcatenatedStream::new(vec![Arc::clone(&first), Arc::clone(&second)]).unwrap();

        assert_eq!(Stream::write(&mut stream, b"abcd").unwrap(), 4);
        assert_eq!(Stream::write(&mut stream, b"efg").unwrap(), 1);
        assert_eq!(Stream::write(&mut stream, b"h").unwrap(), 0);
        assert_eq!(stream.position(), 5);

        let first = first.lock();
        assert_eq!(first.position(), 2);
        drop(first);
        assert_eq!(second.lock().len(), Some(3));
    }

    /// Reads and writes nothing, failing every call with `kind`.
    struct Failing(io::ErrorKind);

    impl Stream for Failing {
        fn can_read(&self) -> bool {
            true
        }

        fn can_write(&self) -> bool {
            true
        }

        fn position(&self) -> u64 {
            0
        }

        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(self.0.into())
        }

        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(self.0.into())
        }
    }

    #[test]
    fn read_failure_after_progress_keeps_the_bytes() {
        let mut stream = ConcatenatedStream::new(vec![
            shared(MemoryStream::from_bytes(b"abc")),
            shared(Failing(io::ErrorKind::Interrupted)),
        ])
        .unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(Stream::read(&mut stream, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(stream.position(), 3);

        let err = Stream::read(&mut stream, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert_eq!(stream.position(), 3);
    }

    #[test]
    fn write_failure_after_progress_reports_the_partial_write() {
        let first = shared(MemoryStream::with_fixed_capacity(2));
        let mut stream = ConcatenatedStream::new(vec![
            Arc::clone(&first),
            shared(Failing(io::ErrorKind::BrokenPipe)),
        ])
        .unwrap();

        assert_eq!(Stream::write(&mut stream, b"abcd").unwrap(), 2);
        assert_eq!(stream.position(), 2);
        let err = Stream::write(&mut stream, b"cd").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(first.lock().position(), 2);
    }

    #[test]
    fn capability_mismatch_is_rejected() {
        let read_only = shared(MemoryStream::read_only(vec![1]));
        let closed = shared(MemoryStream::new());
        closed.lock().close().unwrap();
        assert!(matches!(
            ConcatenatedStream::new(vec![read_only, closed]),
            Err(StorageError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn mixed_capabilities_keep_the_common_one() {
        let stream = ConcatenatedStream::new(vec![
            shared(MemoryStream::read_only(vec![1])),
            shared(MemoryStream::new()),
        ])
        .unwrap();
        assert!(stream.can_read());
        assert!(!stream.can_write());
    }

    #[test]
    fn seeking_is_unsupported() {
        let mut stream = ConcatenatedStream::new(readable(&[1])).unwrap();
        let err = Stream::seek(&mut stream, SeekFrom::Start(0)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert!(Stream::set_len(&mut stream, 0).is_err());
    }

    #[test]
    fn io_read_to_end_collects_everything() {
        use std::io::Read;
        let mut stream = ConcatenatedStream::new(readable(&[2, 0, 3])).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5]);
    }
}
