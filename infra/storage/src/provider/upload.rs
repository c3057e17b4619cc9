use crate::error::StorageError;
use crate::stream::{MemoryStream, Stream, unsupported};
use std::fmt;
use std::io::{self, SeekFrom};
use tracing::warn;

/// Hands the buffered bytes to the backend.
pub(crate) type Commit = Box<dyn FnOnce(&[u8]) -> Result<(), StorageError> + Send>;

/// A write stream for backends that only accept whole uploads.
///
/// Bytes are buffered in memory and committed on [`Stream::close`]. Dropping an
/// unclosed stream commits too; a failure there can only be logged.
pub struct UploadStream {
    target: String,
    buffer: MemoryStream,
    commit: Option<Commit>,
}

impl UploadStream {
    pub(crate) fn new(target: impl Into<String>, commit: Commit) -> Self {
        Self { target: target.into(), buffer: MemoryStream::new(), commit: Some(commit) }
    }

    /// Provider path the bytes are uploaded to.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    fn buffer(&mut self) -> io::Result<&mut MemoryStream> {
        if self.commit.is_some() {
            Ok(&mut self.buffer)
        } else {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "upload stream is closed"))
        }
    }
}

impl fmt::Debug for UploadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadStream")
            .field("target", &self.target)
            .field("buffered", &self.buffer.as_slice().len())
            .field("closed", &self.commit.is_none())
            .finish()
    }
}

impl Stream for UploadStream {
    fn can_write(&self) -> bool {
        self.commit.is_some()
    }

    fn can_seek(&self) -> bool {
        self.commit.is_some()
    }

    fn len(&self) -> Option<u64> {
        self.buffer.len()
    }

    fn position(&self) -> u64 {
        self.buffer.position()
    }

    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(unsupported("upload streams are write-only"))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer()?.write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer()?.seek(pos)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.buffer()?.set_len(len)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.commit.take() {
            Some(commit) => commit(self.buffer.as_slice()).map_err(io::Error::from),
            None => Ok(()),
        }
    }
}

impl Drop for UploadStream {
    fn drop(&mut self) {
        if let Some(commit) = self.commit.take()
            && let Err(err) = commit(self.buffer.as_slice())
        {
            warn!(path = %self.target, error = %err, "Implicit upload on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording() -> (Arc<Mutex<Vec<Vec<u8>>>>, Commit) {
        let uploads = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&uploads);
        let commit: Commit = Box::new(move |bytes: &[u8]| {
            sink.lock().push(bytes.to_vec());
            Ok(())
        });
        (uploads, commit)
    }

    #[test]
    fn close_uploads_once() {
        let (uploads, commit) = recording();
        let mut stream = UploadStream::new("a/b.bin", commit);
        stream.write(b"hello ").unwrap();
        stream.write(b"world").unwrap();
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(stream.write(b"!").is_err());
        drop(stream);
        assert_eq!(*uploads.lock(), vec![b"hello world".to_vec()]);
    }

    #[test]
    fn drop_commits_unclosed_streams() {
        let (uploads, commit) = recording();
        let mut stream = UploadStream::new("c.bin", commit);
        stream.write(b"late").unwrap();
        drop(stream);
        assert_eq!(*uploads.lock(), vec![b"late".to_vec()]);
    }

    #[test]
    fn failed_commit_surfaces_on_close() {
        let commit: Commit = Box::new(|_: &[u8]| Err(StorageError::backend("quota exceeded")));
        let mut stream = UploadStream::new("d.bin", commit);
        assert_eq!(stream.close().unwrap_err().kind(), io::ErrorKind::Other);
        assert!(!stream.can_write());
    }
}
