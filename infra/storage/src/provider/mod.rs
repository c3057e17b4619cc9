//! The uniform storage surface and its backends.
//!
//! Every backend implements both [`StorageProvider`] (blocking) and
//! [`AsyncStorageProvider`] with identical semantics. Paths are relative to the
//! provider root and use `/` (a `\` from callers is accepted). Listing results are
//! full paths built as `{path}/{name}`.

pub mod filesystem;
pub mod ftp;
mod rules;
pub mod tree;
mod upload;

pub use filesystem::FileSystemStorageProvider;
pub use ftp::{FtpClient, FtpStorageProvider};
pub use rules::EntryKind;
pub use tree::TreeStorageProvider;
pub use upload::UploadStream;

use crate::error::StorageError;
use crate::mode::FileMode;
use crate::stream::{IoAdapter, Stream};
use async_trait::async_trait;
use std::io::Read;
use tokio::io::AsyncRead;

/// Blocking storage operations.
///
/// Implementations backed by an async runtime must not be driven from inside a
/// runtime worker thread.
pub trait StorageProvider: Send + Sync {
    /// Human-readable backend name.
    fn provider(&self) -> &'static str;

    /// The configured root, if any.
    fn root(&self) -> Option<&str>;

    /// Maps a caller path to the backend's own addressing.
    ///
    /// # Errors
    /// Returns [`StorageError::PathTraversalAttempt`] when a sandboxed backend rejects
    /// the path.
    fn prepare_path(&self, path: &str) -> Result<String, StorageError>;

    /// Writes `data` to `path` according to `mode`.
    ///
    /// # Errors
    /// * [`StorageError::InvalidArgument`] for [`FileMode::Open`] / [`FileMode::OpenOrCreate`].
    /// * [`StorageError::AlreadyExists`] for [`FileMode::CreateNew`] over an existing entry.
    /// * [`StorageError::FileNotFound`] for [`FileMode::Truncate`] of a missing file.
    /// * [`StorageError::DirectoryNotFound`] / [`StorageError::TypeMismatch`] when the
    ///   parent is missing or not a directory.
    /// * [`StorageError::Unsupported`] for [`FileMode::Append`] on backends without it.
    fn write_data(&self, path: &str, mode: FileMode, data: &[u8]) -> Result<(), StorageError>;

    /// Like [`StorageProvider::write_data`], pulling the bytes from `source`.
    /// Returns the number of bytes written.
    ///
    /// # Errors
    /// As [`StorageProvider::write_data`], plus [`StorageError::Io`] if `source` fails.
    fn write_from(
        &self,
        path: &str,
        mode: FileMode,
        source: &mut dyn Read,
    ) -> Result<u64, StorageError>;

    /// # Errors
    /// [`StorageError::FileNotFound`] if nothing readable lives at `path`.
    fn read_stream(&self, path: &str) -> Result<Box<dyn Stream>, StorageError>;

    /// Opens a stream whose contents are committed to `path` on close.
    ///
    /// # Errors
    /// The mode checks of [`StorageProvider::write_data`], applied at open time.
    fn write_stream(&self, path: &str, mode: FileMode) -> Result<Box<dyn Stream>, StorageError>;

    /// Reads the whole file at `path`.
    ///
    /// # Errors
    /// As [`StorageProvider::read_stream`], plus [`StorageError::Io`] while reading.
    fn read_data(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let mut reader = IoAdapter(self.read_stream(path)?);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }

    /// `Ok(false)` when `recursive` is off and the directory has children.
    ///
    /// # Errors
    /// [`StorageError::DirectoryNotFound`] if missing, [`StorageError::TypeMismatch`] if
    /// `path` is not a directory.
    fn delete_directory(&self, path: &str, recursive: bool) -> Result<bool, StorageError>;

    /// `Ok(false)` when the directory already exists.
    ///
    /// # Errors
    /// [`StorageError::TypeMismatch`] if a non-directory occupies `path`,
    /// [`StorageError::DirectoryNotFound`] if the parent is missing.
    fn create_directory(&self, path: &str) -> Result<bool, StorageError>;

    /// # Errors
    /// Backend failures only; a missing entry is `Ok(false)`.
    fn directory_exists(&self, path: &str) -> Result<bool, StorageError>;

    /// # Errors
    /// [`StorageError::FileNotFound`] for a missing source, [`StorageError::AlreadyExists`]
    /// when the destination exists and `overwrite` is off.
    fn move_file(&self, path: &str, new_path: &str, overwrite: bool) -> Result<(), StorageError>;

    /// # Errors
    /// As [`StorageProvider::move_file`].
    fn copy_file(&self, path: &str, new_path: &str, overwrite: bool) -> Result<(), StorageError>;

    /// # Errors
    /// [`StorageError::FileNotFound`] if missing, [`StorageError::TypeMismatch`] if
    /// `path` is not a file.
    fn delete_file(&self, path: &str) -> Result<bool, StorageError>;

    /// # Errors
    /// Backend failures only; a missing entry is `Ok(false)`.
    fn file_exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Files directly under `path`.
    ///
    /// # Errors
    /// [`StorageError::DirectoryNotFound`] / [`StorageError::TypeMismatch`].
    fn list_files(&self, path: &str) -> Result<Vec<String>, StorageError>;

    /// Directories directly under `path`.
    ///
    /// # Errors
    /// [`StorageError::DirectoryNotFound`] / [`StorageError::TypeMismatch`].
    fn list_directories(&self, path: &str) -> Result<Vec<String>, StorageError>;

    /// Releases backend resources. Idempotent.
    ///
    /// # Errors
    /// Whatever releasing the backend reports.
    fn close(&self) -> Result<(), StorageError>;
}

/// Async storage operations, mirroring [`StorageProvider`] one to one.
#[async_trait]
pub trait AsyncStorageProvider: Send + Sync {
    fn provider(&self) -> &'static str;

    fn root(&self) -> Option<&str>;

    /// # Errors
    /// As [`StorageProvider::prepare_path`].
    fn prepare_path(&self, path: &str) -> Result<String, StorageError>;

    /// # Errors
    /// As [`StorageProvider::write_data`].
    async fn write_data(&self, path: &str, mode: FileMode, data: &[u8])
    -> Result<(), StorageError>;

    /// # Errors
    /// As [`StorageProvider::write_from`].
    async fn write_from(
        &self,
        path: &str,
        mode: FileMode,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, StorageError>;

    /// # Errors
    /// As [`StorageProvider::read_stream`].
    async fn read_stream(&self, path: &str) -> Result<Box<dyn Stream>, StorageError>;

    /// # Errors
    /// As [`StorageProvider::write_stream`].
    async fn write_stream(
        &self,
        path: &str,
        mode: FileMode,
    ) -> Result<Box<dyn Stream>, StorageError>;

    /// # Errors
    /// As [`StorageProvider::read_data`].
    async fn read_data(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let stream = self.read_stream(path).await?;
        tokio::task::spawn_blocking(move || {
            let mut reader = IoAdapter(stream);
            let mut data = Vec::new();
            reader.read_to_end(&mut data).map(|_| data)
        })
        .await
        .map_err(|err| StorageError::Internal {
            message: err.to_string().into(),
            context: Some("read task failed".into()),
        })?
        .map_err(StorageError::from)
    }

    /// # Errors
    /// As [`StorageProvider::delete_directory`].
    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<bool, StorageError>;

    /// # Errors
    /// As [`StorageProvider::create_directory`].
    async fn create_directory(&self, path: &str) -> Result<bool, StorageError>;

    /// # Errors
    /// As [`StorageProvider::directory_exists`].
    async fn directory_exists(&self, path: &str) -> Result<bool, StorageError>;

    /// # Errors
    /// As [`StorageProvider::move_file`].
    async fn move_file(
        &self,
        path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), StorageError>;

    /// # Errors
    /// As [`StorageProvider::copy_file`].
    async fn copy_file(
        &self,
        path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), StorageError>;

    /// # Errors
    /// As [`StorageProvider::delete_file`].
    async fn delete_file(&self, path: &str) -> Result<bool, StorageError>;

    /// # Errors
    /// As [`StorageProvider::file_exists`].
    async fn file_exists(&self, path: &str) -> Result<bool, StorageError>;

    /// # Errors
    /// As [`StorageProvider::list_files`].
    async fn list_files(&self, path: &str) -> Result<Vec<String>, StorageError>;

    /// # Errors
    /// As [`StorageProvider::list_directories`].
    async fn list_directories(&self, path: &str) -> Result<Vec<String>, StorageError>;

    /// # Errors
    /// As [`StorageProvider::close`].
    async fn close(&self) -> Result<(), StorageError>;
}

/// Builds the `{path}/{name}` form listings return.
pub(crate) fn child_path(path: &str, name: &str) -> String {
    let path = crate::path::normalize(path);
    let parent = path.trim_end_matches('/');
    if parent.trim().is_empty() { name.to_owned() } else { format!("{parent}/{name}") }
}
