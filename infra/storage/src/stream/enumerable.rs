use crate::stream::{Stream, unsupported};
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};

/// Buffer size used by [`BufferedEnumerableStream::new`]: eight machine words.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * size_of::<usize>();

/// Upper bound on the buffer size. Keeps the packed cursor far from overflowing into
/// the fill length even when many readers overshoot the same fill.
const MAX_BUFFER_SIZE: usize = 1 << 20;

const CURSOR_MASK: u64 = u32::MAX as u64;

const fn pack(filled: usize, cursor: usize) -> u64 {
    ((filled as u64) << 32) | (cursor as u64 & CURSOR_MASK)
}

#[allow(clippy::cast_possible_truncation)]
const fn unpack(word: u64) -> (usize, usize) {
    ((word >> 32) as usize, (word & CURSOR_MASK) as usize)
}

/// Read-only stream pulling bytes from an iterator through a fixed buffer.
///
/// Readers share the stream by reference (`&self`) from any number of threads. The
/// fast path is lock-free: a packed atomic word holds the fill length and the read
/// cursor, and each reader claims its range with one `fetch_add`. Only refilling takes
/// the source lock, and a refill waits until every byte claimed from the previous fill
/// has been copied out before overwriting the buffer. Each byte of the source is
/// handed to exactly one reader.
///
/// ```rust
/// use depot_storage::stream::BufferedEnumerableStream;
/// use std::io::Read;
///
/// let mut stream = BufferedEnumerableStream::with_capacity(b"hello world".iter().copied(), 4);
/// let mut text = String::new();
/// stream.read_to_string(&mut text).unwrap();
/// assert_eq!(text, "hello world");
/// ```
pub struct BufferedEnumerableStream<I> {
    source: Mutex<Option<I>>,
    buffer: Box<[AtomicU8]>,
    window: AtomicU64,
    consumed: AtomicUsize,
    complete: AtomicBool,
    position: AtomicU64,
    length: Option<u64>,
}

impl<I: Iterator<Item = u8>> BufferedEnumerableStream<I> {
    #[must_use]
    pub fn new(source: I) -> Self {
        Self::with_capacity(source, DEFAULT_BUFFER_SIZE)
    }

    /// `capacity` is clamped to at least one byte.
    #[must_use]
    pub fn with_capacity(source: I, capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_BUFFER_SIZE);
        let length = match source.size_hint() {
            (lower, Some(upper)) if lower == upper => u64::try_from(lower).ok(),
            _ => None,
        };
        Self {
            source: Mutex::new(Some(source)),
            buffer: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
            window: AtomicU64::new(pack(0, 0)),
            consumed: AtomicUsize::new(0),
            complete: AtomicBool::new(false),
            position: AtomicU64::new(0),
            length,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// `true` once the source has run dry or the stream was closed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Shared-reference read. Returns 0 once the source is exhausted, forever after.
    pub fn read_shared(&self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < buf.len() && !self.is_complete() {
            let want = (buf.len() - copied).min(self.buffer.len());
            let (filled, cursor) = unpack(self.window.fetch_add(want as u64, Ordering::AcqRel));

            if cursor >= filled {
                self.refill();
                continue;
            }

            let take = want.min(filled - cursor);
            for (dst, src) in buf[copied..copied + take]
                .iter_mut()
                .zip(&self.buffer[cursor..cursor + take])
            {
                *dst = src.load(Ordering::Relaxed);
            }
            self.consumed.fetch_add(take, Ordering::Release);
            self.position.fetch_add(take as u64, Ordering::Relaxed);
            copied += take;
        }
        copied
    }

    fn refill(&self) {
        let mut source = self.source.lock();

        if self.is_complete() {
            return;
        }
        let (filled, cursor) = unpack(self.window.load(Ordering::Acquire));
        if cursor < filled {
            return;
        }

        while self.consumed.load(Ordering::Acquire) < filled {
            std::hint::spin_loop();
            std::thread::yield_now();
        }

        let Some(iter) = source.as_mut() else {
            self.complete.store(true, Ordering::Release);
            return;
        };
        let mut pulled = 0;
        for (slot, byte) in self.buffer.iter().zip(iter.by_ref()) {
            slot.store(byte, Ordering::Relaxed);
            pulled += 1;
        }

        self.consumed.store(0, Ordering::Relaxed);
        if pulled == 0 {
            *source = None;
            self.complete.store(true, Ordering::Release);
        } else {
            self.window.store(pack(pulled, 0), Ordering::Release);
        }
    }

    /// Drops the source. Later reads return 0.
    pub fn close_shared(&self) {
        let source = self.source.lock().take();
        self.complete.store(true, Ordering::Release);
        drop(source);
    }
}

impl<I> fmt::Debug for BufferedEnumerableStream<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (filled, cursor) = unpack(self.window.load(Ordering::Relaxed));
        f.debug_struct("BufferedEnumerableStream")
            .field("capacity", &self.buffer.len())
            .field("filled", &filled)
            .field("cursor", &cursor)
            .field("position", &self.position.load(Ordering::Relaxed))
            .field("complete", &self.complete.load(Ordering::Relaxed))
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

impl<I: Iterator<Item = u8> + Send> Stream for BufferedEnumerableStream<I> {
    fn can_read(&self) -> bool {
        true
    }

    fn len(&self) -> Option<u64> {
        self.length
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_shared(buf))
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(unsupported("enumerable streams are read-only"))
    }

    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(unsupported("enumerable streams cannot seek"))
    }

    fn close(&mut self) -> io::Result<()> {
        self.close_shared();
        Ok(())
    }
}

impl<I: Iterator<Item = u8>> io::Read for BufferedEnumerableStream<I> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_shared(buf))
    }
}

impl<I: Iterator<Item = u8>> io::Read for &BufferedEnumerableStream<I> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_shared(buf))
    }
}
