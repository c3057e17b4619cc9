//! Capability-reporting byte streams and the composite adapters built on them.
//!
//! [`Stream`] is the object-safe shape every provider hands out. The adapters
//! ([`ConcatenatedStream`], [`MultiStream`], [`BufferedEnumerableStream`]) also speak
//! `std::io` so they compose with `io::copy` and friends.

mod concatenated;
mod enumerable;
mod file;
mod memory;
mod multi;

pub use concatenated::ConcatenatedStream;
pub use enumerable::{BufferedEnumerableStream, DEFAULT_BUFFER_SIZE};
pub use file::FileStream;
pub use memory::MemoryStream;
pub use multi::MultiStream;

use crate::error::StorageError;
use parking_lot::Mutex;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

/// A backing stream shared between composites and their creator.
pub type SharedStream = Arc<Mutex<dyn Stream>>;

/// Wraps a concrete stream so it can be handed to a composite.
pub fn shared<S: Stream + 'static>(stream: S) -> SharedStream {
    Arc::new(Mutex::new(stream))
}

pub(crate) fn unsupported(what: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, what)
}

/// A byte stream that reports what it can do.
///
/// Every operation defaults to [`io::ErrorKind::Unsupported`]; implementors override
/// the ones their capabilities allow.
pub trait Stream: Send {
    fn can_read(&self) -> bool {
        false
    }

    fn can_write(&self) -> bool {
        false
    }

    fn can_seek(&self) -> bool {
        false
    }

    /// Total length in bytes, `None` when unknown.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Current logical position.
    fn position(&self) -> u64;

    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(unsupported("stream is not readable"))
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(unsupported("stream is not writable"))
    }

    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(unsupported("stream is not seekable"))
    }

    fn set_len(&mut self, _len: u64) -> io::Result<()> {
        Err(unsupported("stream length is fixed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Releases whatever the stream holds. Further calls are no-ops.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn can_read(&self) -> bool {
        (**self).can_read()
    }

    fn can_write(&self) -> bool {
        (**self).can_write()
    }

    fn can_seek(&self) -> bool {
        (**self).can_seek()
    }

    fn len(&self) -> Option<u64> {
        (**self).len()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        (**self).seek(pos)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Adapts any [`Stream`] to `std::io`.
#[derive(Debug)]
pub struct IoAdapter<S>(pub S);

impl<S: Stream> Read for IoAdapter<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<S: Stream> Write for IoAdapter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<S: Stream> Seek for IoAdapter<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

/// Writes the whole buffer into `stream`, failing with `WriteZero` if it stops
/// accepting bytes.
pub(crate) fn write_all(stream: &mut dyn Stream, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match stream.write(buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "backing stream refused further bytes",
                ));
            },
            Ok(n) => buf = &buf[n..],
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {},
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Rejects empty lists and repeated handles, comparing `Arc` data pointers.
pub(crate) fn check_distinct(streams: &[SharedStream]) -> Result<(), StorageError> {
    if streams.is_empty() {
        return Err(StorageError::invalid_argument("at least one backing stream is required"));
    }
    for (index, stream) in streams.iter().enumerate() {
        let ptr = Arc::as_ptr(stream).cast::<()>();
        if streams[..index].iter().any(|earlier| Arc::as_ptr(earlier).cast::<()>() == ptr) {
            return Err(StorageError::invalid_argument(format!(
                "backing stream {index} appears more than once"
            )));
        }
    }
    Ok(())
}
