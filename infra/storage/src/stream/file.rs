use crate::stream::{Stream, unsupported};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// A local file with the access it was opened for.
#[derive(Debug)]
pub struct FileStream {
    file: File,
    readable: bool,
    writable: bool,
    closed: bool,
}

impl FileStream {
    #[must_use]
    pub const fn reader(file: File) -> Self {
        Self { file, readable: true, writable: false, closed: false }
    }

    #[must_use]
    pub const fn writer(file: File) -> Self {
        Self { file, readable: false, writable: true, closed: false }
    }

    #[must_use]
    pub fn into_inner(self) -> File {
        self.file
    }

    fn open(&self) -> io::Result<&File> {
        if self.closed {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "file stream is closed"))
        } else {
            Ok(&self.file)
        }
    }
}

impl Stream for FileStream {
    fn can_read(&self) -> bool {
        self.readable && !self.closed
    }

    fn can_write(&self) -> bool {
        self.writable && !self.closed
    }

    fn can_seek(&self) -> bool {
        !self.closed
    }

    fn len(&self) -> Option<u64> {
        self.file.metadata().ok().map(|meta| meta.len())
    }

    fn position(&self) -> u64 {
        let mut file = &self.file;
        file.stream_position().unwrap_or(0)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.readable {
            return Err(unsupported("file was opened for writing"));
        }
        self.open()?.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(unsupported("file was opened for reading"));
        }
        self.open()?.write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.open()?.seek(pos)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        if !self.writable {
            return Err(unsupported("file was opened for reading"));
        }
        self.open()?.set_len(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.open()?.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.writable {
            self.file.sync_all()?;
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_follow_access() {
        let mut writer = FileStream::writer(tempfile::tempfile().unwrap());
        assert_eq!(Stream::write(&mut writer, b"hello").unwrap(), 5);
        assert_eq!(writer.len(), Some(5));
        assert_eq!(writer.position(), 5);
        assert_eq!(Stream::read(&mut writer, &mut [0; 2]).unwrap_err().kind(), io::ErrorKind::Unsupported);

        let mut file = writer.into_inner();
        file.rewind().unwrap();
        let mut reader = FileStream::reader(file);
        let mut buf = [0; 5];
        assert_eq!(Stream::read(&mut reader, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert!(!reader.can_write());
        reader.close().unwrap();
        assert!(Stream::read(&mut reader, &mut buf).is_err());
    }
}
