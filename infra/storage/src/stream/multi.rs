use crate::error::StorageError;
use crate::stream::{SharedStream, Stream, check_distinct, unsupported, write_all};
use std::fmt;
use std::io::{self, SeekFrom};

/// Write-only fan-out: every byte written lands in every backing stream.
///
/// Each write is replicated in full to the backing streams in order. A backing stream
/// that cannot take the whole buffer fails the write with `WriteZero`; streams earlier
/// in the list keep what they already received.
///
/// Seeking moves every backing stream. If they end up at different positions (one of
/// them clamps, say) the seek fails with `InvalidData`, since the fan-out no longer
/// has a single position.
pub struct MultiStream {
    streams: Vec<SharedStream>,
    position: u64,
    seekable: bool,
}

impl MultiStream {
    /// # Errors
    /// Returns [`StorageError::InvalidArgument`] when `streams` is empty, holds the same
    /// stream twice, or contains a stream that cannot be written.
    pub fn new(streams: Vec<SharedStream>) -> Result<Self, StorageError> {
        check_distinct(&streams)?;

        let mut seekable = true;
        for (index, stream) in streams.iter().enumerate() {
            let stream = stream.lock();
            if !stream.can_write() {
                return Err(StorageError::invalid_argument(format!(
                    "backing stream {index} is not writable"
                )));
            }
            seekable &= stream.can_seek();
        }

        Ok(Self { streams, position: 0, seekable })
    }

    fn ensure_seekable(&self) -> io::Result<()> {
        if self.seekable {
            Ok(())
        } else {
            Err(unsupported("not every backing stream can seek"))
        }
    }

    /// Moves every backing stream to `position`.
    ///
    /// # Errors
    /// As [`Stream::seek`].
    pub fn set_position(&mut self, position: u64) -> io::Result<()> {
        Stream::seek(self, SeekFrom::Start(position)).map(|_| ())
    }
}

impl fmt::Debug for MultiStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiStream")
            .field("streams", &self.streams.len())
            .field("position", &self.position)
            .field("seekable", &self.seekable)
            .finish()
    }
}

impl Stream for MultiStream {
    fn can_write(&self) -> bool {
        true
    }

    fn can_seek(&self) -> bool {
        self.seekable
    }

    /// The shortest backing length, unknown if any backing length is unknown.
    fn len(&self) -> Option<u64> {
        self.streams.iter().map(|stream| stream.lock().len()).try_fold(u64::MAX, |min, len| {
            len.map(|len| min.min(len))
        })
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(unsupported("multi streams are write-only"))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for stream in &self.streams {
            write_all(&mut *stream.lock(), buf)?;
        }
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.ensure_seekable()?;
        let mut landed = None;
        for stream in &self.streams {
            let at = stream.lock().seek(pos)?;
            match landed {
                None => landed = Some(at),
                Some(first) if first != at => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("backing streams diverged after seek ({first} vs {at})"),
                    ));
                },
                Some(_) => {},
            }
        }
        let position = landed.unwrap_or(self.position);
        self.position = position;
        Ok(position)
    }

    fn set_len(&mut self, _len: u64) -> io::Result<()> {
        Err(unsupported("multi streams cannot be resized"))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.streams.iter().try_for_each(|stream| stream.lock().flush())
    }
}

impl io::Write for MultiStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Stream::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Stream::flush(self)
    }
}

impl io::Seek for MultiStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Stream::seek(self, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{MemoryStream, shared};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn contents(stream: &Arc<Mutex<MemoryStream>>) -> Vec<u8> {
        stream.lock().as_slice().to_vec()
    }

    fn handle(stream: &Arc<Mutex<MemoryStream>>) -> SharedStream {
        stream.clone()
    }

    #[test]
    fn writes_are_replicated() {
        let a = Arc::new(Mutex::new(MemoryStream::new()));
        let b = Arc::new(Mutex::new(MemoryStream::new()));
        let mut multi = MultiStream::new(vec![handle(&a), handle(&b)]).unwrap();

        io::Write::write_all(&mut multi, b"replicate me").unwrap();
        assert_eq!(contents(&a), b"replicate me");
        assert_eq!(contents(&b), b"replicate me");
        assert_eq!(multi.position(), 12);
        assert_eq!(multi.len(), Some(12));
    }

    #[test]
    fn read_only_member_is_rejected() {
        let result = MultiStream::new(vec![
            shared(MemoryStream::new()),
            shared(MemoryStream::read_only(vec![])),
        ]);
        assert!(matches!(result, Err(StorageError::InvalidArgument { .. })));
    }

    #[test]
    fn fixed_member_fails_instead_of_truncating() {
        let roomy = Arc::new(Mutex::new(MemoryStream::new()));
        let tight = Arc::new(Mutex::new(MemoryStream::with_fixed_capacity(3)));
        let mut multi = MultiStream::new(vec![handle(&roomy), handle(&tight)]).unwrap();

        let err = Stream::write(&mut multi, b"abcdef").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(contents(&roomy), b"abcdef");
        assert_eq!(contents(&tight), b"abc");
        assert_eq!(multi.position(), 0);
    }

    #[test]
    fn seek_moves_every_member() {
        let a = Arc::new(Mutex::new(MemoryStream::from_bytes(b"0000")));
        let b = Arc::new(Mutex::new(MemoryStream::from_bytes(b"1111")));
        let mut multi = MultiStream::new(vec![handle(&a), handle(&b)]).unwrap();

        multi.set_position(2).unwrap();
        Stream::write(&mut multi, b"xy").unwrap();
        assert_eq!(contents(&a), b"00xy");
        assert_eq!(contents(&b), b"11xy");
        assert_eq!(multi.position(), 4);
    }

    #[test]
    fn diverging_seek_is_reported() {
        let short = shared(MemoryStream::from_bytes(b"ab"));
        let long = shared(MemoryStream::from_bytes(b"abcdef"));
        let mut multi = MultiStream::new(vec![short, long]).unwrap();
        let err = Stream::seek(&mut multi, SeekFrom::End(0)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(multi.len(), Some(2));
    }

    #[test]
    fn reading_is_unsupported() {
        let mut multi = MultiStream::new(vec![shared(MemoryStream::new())]).unwrap();
        let err = Stream::read(&mut multi, &mut [0; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
