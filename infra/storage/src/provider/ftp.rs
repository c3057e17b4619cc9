//! A provider over an FTP session.
//!
//! The wire protocol lives behind [`FtpClient`]; this module only maps the uniform
//! operation set onto it. Async operations run the blocking client on the tokio
//! blocking pool.

use crate::config::FtpSettings;
use crate::error::StorageError;
use crate::mode::FileMode;
use crate::path;
use crate::provider::upload::UploadStream;
use crate::provider::{AsyncStorageProvider, EntryKind, StorageProvider, child_path, rules};
use crate::stream::{MemoryStream, Stream};
use async_trait::async_trait;
use std::io::Read;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// One row of a server directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl FtpEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self { name: name.into(), kind }
    }
}

/// A connected FTP session. Paths are server paths, already prefixed with the root.
///
/// Implementations own reconnects, TLS and retries.
pub trait FtpClient: Send + Sync {
    /// What occupies `path`, `None` when nothing does.
    ///
    /// # Errors
    /// Transport failures, as [`StorageError::Backend`].
    fn entry_kind(&self, path: &str) -> Result<Option<EntryKind>, StorageError>;

    /// # Errors
    /// Transport failures.
    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.entry_kind(path).map(|kind| kind.is_some())
    }

    /// # Errors
    /// Transport failures or a missing file.
    fn download(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Stores `data` at `path`, replacing any file there.
    ///
    /// # Errors
    /// Transport failures.
    fn upload(&self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// # Errors
    /// Transport failures.
    fn append(&self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// # Errors
    /// Transport failures.
    fn delete_file(&self, path: &str) -> Result<(), StorageError>;

    /// # Errors
    /// Transport failures.
    fn make_directory(&self, path: &str) -> Result<(), StorageError>;

    /// # Errors
    /// Transport failures.
    fn remove_directory(&self, path: &str, recursive: bool) -> Result<(), StorageError>;

    /// # Errors
    /// Transport failures.
    fn rename(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Direct children of the directory at `path`.
    ///
    /// # Errors
    /// Transport failures.
    fn list(&self, path: &str) -> Result<Vec<FtpEntry>, StorageError>;

    /// Ends the session.
    ///
    /// # Errors
    /// Transport failures.
    fn quit(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct FtpInner {
    client: Arc<dyn FtpClient>,
    root: Option<String>,
    closed: AtomicBool,
}

impl std::fmt::Debug for dyn FtpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FtpClient")
    }
}

/// Cheaply cloneable FTP provider handle.
#[derive(Debug, Clone)]
pub struct FtpStorageProvider {
    inner: Arc<FtpInner>,
}

impl Deref for FtpStorageProvider {
    type Target = FtpInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FtpStorageProvider {
    pub(crate) const NAME: &'static str = "FTP";

    /// `root` is prepended to every path that does not already start with it.
    pub fn new(client: Arc<dyn FtpClient>, root: Option<&str>) -> Self {
        let root = root.map(str::trim).filter(|root| !root.is_empty()).map(|root| {
            let root = path::normalize(root);
            if root.len() > 1 { root.trim_end_matches('/').to_owned() } else { root.into_owned() }
        });
        info!(root = root.as_deref().unwrap_or(""), "FTP provider ready");
        Self { inner: Arc::new(FtpInner { client, root, closed: AtomicBool::new(false) }) }
    }

    /// Builds the session with `connect` and roots the provider where `settings` say.
    ///
    /// # Errors
    /// Whatever `connect` reports.
    pub fn from_settings<F>(settings: &FtpSettings, connect: F) -> Result<Self, StorageError>
    where
        F: FnOnce(&FtpSettings) -> Result<Arc<dyn FtpClient>, StorageError>,
    {
        let client = connect(settings)?;
        Ok(Self::new(client, settings.root.as_deref()))
    }

    #[must_use]
    pub fn client(&self) -> &Arc<dyn FtpClient> {
        &self.client
    }

    /// Server path for a caller path: paths already under the root are kept, every
    /// other path is placed below it.
    #[must_use]
    pub fn server_path(&self, path: &str) -> String {
        let path = path::normalize(path.trim());
        let Some(root) = self.root.as_deref() else {
            return path.into_owned();
        };
        if is_within(&path, root) {
            return path.into_owned();
        }
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            root.to_owned()
        } else if root.ends_with('/') {
            format!("{root}{relative}")
        } else {
            format!("{root}/{relative}")
        }
    }

    fn is_root_path(&self, server_path: &str) -> bool {
        let trimmed = server_path.trim_end_matches('/');
        match self.root.as_deref() {
            Some(root) => trimmed == root.trim_end_matches('/'),
            None => trimmed.is_empty(),
        }
    }

    fn probe(&self, server_path: &str) -> Result<Option<EntryKind>, StorageError> {
        if self.is_root_path(server_path) {
            return Ok(Some(EntryKind::Directory));
        }
        self.client.entry_kind(server_path)
    }

    fn require_parent(&self, path: &str, server_path: &str) -> Result<(), StorageError> {
        let parent = server_parent(server_path);
        let found = if parent.is_empty() { Some(EntryKind::Directory) } else { self.probe(&parent)? };
        rules::require_directory(&path::split_parent(path).0, found)
    }

    /// Validates a write and returns the server path and effective mode.
    fn prepare_write(&self, path: &str, mode: FileMode) -> Result<(String, FileMode), StorageError> {
        let target = self.server_path(path);
        let mode = rules::check_write(path, mode, self.probe(&target)?)?;
        self.require_parent(path, &target)?;
        Ok((target, mode))
    }

    fn commit(&self, target: &str, mode: FileMode, data: &[u8]) -> Result<(), StorageError> {
        if mode == FileMode::Append {
            self.client.append(target, data)?;
        } else {
            self.client.upload(target, data)?;
        }
        debug!(path = target, bytes = data.len(), ?mode, "FTP upload finished");
        Ok(())
    }

    fn list_kind(&self, path: &str, wanted: EntryKind) -> Result<Vec<String>, StorageError> {
        let dir = self.server_path(path);
        rules::require_directory(path, self.probe(&dir)?)?;
        let mut names: Vec<String> = self
            .client
            .list(&dir)?
            .into_iter()
            .filter(|entry| entry.kind == wanted)
            .map(|entry| entry.name)
            .collect();
        names.sort_unstable();
        Ok(names.into_iter().map(|name| child_path(path, &name)).collect())
    }

    fn relocate(
        &self,
        path: &str,
        new_path: &str,
        overwrite: bool,
        keep_source: bool,
    ) -> Result<(), StorageError> {
        let source = self.server_path(path);
        rules::require_file(path, self.probe(&source)?)?;
        let target = self.server_path(new_path);
        let replace = rules::check_destination(new_path, self.probe(&target)?, overwrite)?;
        self.require_parent(new_path, &target)?;

        if keep_source {
            let data = self.client.download(&source)?;
            self.client.upload(&target, &data)?;
        } else {
            if replace {
                self.client.delete_file(&target)?;
            }
            self.client.rename(&source, &target)?;
        }
        debug!(from = %source, to = %target, keep_source, "FTP relocation finished");
        Ok(())
    }

    /// Runs a blocking operation on the blocking pool.
    async fn offload<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T, StorageError> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || op(&this)).await.map_err(|err| {
            StorageError::Internal {
                message: err.to_string().into(),
                context: Some("FTP task failed".into()),
            }
        })?
    }
}

/// Segment-aware prefix test: `/srv` contains `/srv/a` but not `/srvx`.
fn is_within(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return path.starts_with('/');
    }
    path.strip_prefix(root).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Parent of a server path, keeping a leading `/`.
fn server_parent(server_path: &str) -> String {
    let (parent, _) = path::split_parent(server_path);
    if server_path.starts_with('/') { format!("/{parent}") } else { parent }
}

impl StorageProvider for FtpStorageProvider {
    fn provider(&self) -> &'static str {
        Self::NAME
    }

    fn root(&self) -> Option<&str> {
        self.inner.root.as_deref()
    }

    fn prepare_path(&self, path: &str) -> Result<String, StorageError> {
        Ok(self.server_path(path))
    }

    fn write_data(&self, path: &str, mode: FileMode, data: &[u8]) -> Result<(), StorageError> {
        let (target, mode) = self.prepare_write(path, mode)?;
        self.commit(&target, mode, data)
    }

    fn write_from(
        &self,
        path: &str,
        mode: FileMode,
        source: &mut dyn Read,
    ) -> Result<u64, StorageError> {
        let (target, mode) = self.prepare_write(path, mode)?;
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        self.commit(&target, mode, &data)?;
        Ok(data.len() as u64)
    }

    fn read_stream(&self, path: &str) -> Result<Box<dyn Stream>, StorageError> {
        let source = self.server_path(path);
        rules::require_file(path, self.probe(&source)?)?;
        let data = self.client.download(&source)?;
        Ok(Box::new(MemoryStream::read_only(data)))
    }

    fn write_stream(&self, path: &str, mode: FileMode) -> Result<Box<dyn Stream>, StorageError> {
        let (target, mode) = self.prepare_write(path, mode)?;
        let this = self.clone();
        let label = target.clone();
        Ok(Box::new(UploadStream::new(
            label,
            Box::new(move |data: &[u8]| this.commit(&target, mode, data)),
        )))
    }

    fn delete_directory(&self, path: &str, recursive: bool) -> Result<bool, StorageError> {
        let dir = self.server_path(path);
        if self.is_root_path(&dir) {
            return Err(StorageError::invalid_argument("the provider root cannot be deleted"));
        }
        rules::require_directory(path, self.probe(&dir)?)?;
        if !recursive && !self.client.list(&dir)?.is_empty() {
            return Ok(false);
        }
        self.client.remove_directory(&dir, recursive)?;
        debug!(path = %dir, recursive, "FTP directory removed");
        Ok(true)
    }

    fn create_directory(&self, path: &str) -> Result<bool, StorageError> {
        let dir = self.server_path(path);
        if !rules::check_create_directory(path, self.probe(&dir)?)? {
            return Ok(false);
        }
        self.require_parent(path, &dir)?;
        self.client.make_directory(&dir)?;
        debug!(path = %dir, "FTP directory created");
        Ok(true)
    }

    fn directory_exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.probe(&self.server_path(path))? == Some(EntryKind::Directory))
    }

    fn move_file(&self, path: &str, new_path: &str, overwrite: bool) -> Result<(), StorageError> {
        self.relocate(path, new_path, overwrite, false)
    }

    fn copy_file(&self, path: &str, new_path: &str, overwrite: bool) -> Result<(), StorageError> {
        self.relocate(path, new_path, overwrite, true)
    }

    fn delete_file(&self, path: &str) -> Result<bool, StorageError> {
        let file = self.server_path(path);
        rules::require_file(path, self.probe(&file)?)?;
        self.client.delete_file(&file)?;
        debug!(path = %file, "FTP file deleted");
        Ok(true)
    }

    fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.probe(&self.server_path(path))? == Some(EntryKind::File))
    }

    fn list_files(&self, path: &str) -> Result<Vec<String>, StorageError> {
        self.list_kind(path, EntryKind::File)
    }

    fn list_directories(&self, path: &str) -> Result<Vec<String>, StorageError> {
        self.list_kind(path, EntryKind::Directory)
    }

    fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client.quit()?;
        info!("FTP session closed");
        Ok(())
    }
}

#[async_trait]
impl AsyncStorageProvider for FtpStorageProvider {
    fn provider(&self) -> &'static str {
        Self::NAME
    }

    fn root(&self) -> Option<&str> {
        self.inner.root.as_deref()
    }

    fn prepare_path(&self, path: &str) -> Result<String, StorageError> {
        Ok(self.server_path(path))
    }

    async fn write_data(&self, path: &str, mode: FileMode, data: &[u8]) -> Result<(), StorageError> {
        let (path, data) = (path.to_owned(), data.to_vec());
        self.offload(move |this| StorageProvider::write_data(this, &path, mode, &data)).await
    }

    async fn write_from(
        &self,
        path: &str,
        mode: FileMode,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, StorageError> {
        let mut data = Vec::new();
        source.read_to_end(&mut data).await?;
        let written = data.len() as u64;
        AsyncStorageProvider::write_data(self, path, mode, &data).await?;
        Ok(written)
    }

    async fn read_stream(&self, path: &str) -> Result<Box<dyn Stream>, StorageError> {
        let path = path.to_owned();
        self.offload(move |this| StorageProvider::read_stream(this, &path)).await
    }

    async fn write_stream(
        &self,
        path: &str,
        mode: FileMode,
    ) -> Result<Box<dyn Stream>, StorageError> {
        let path = path.to_owned();
        self.offload(move |this| StorageProvider::write_stream(this, &path, mode)).await
    }

    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<bool, StorageError> {
        let path = path.to_owned();
        self.offload(move |this| StorageProvider::delete_directory(this, &path, recursive)).await
    }

    async fn create_directory(&self, path: &str) -> Result<bool, StorageError> {
        let path = path.to_owned();
        self.offload(move |this| StorageProvider::create_directory(this, &path)).await
    }

    async fn directory_exists(&self, path: &str) -> Result<bool, StorageError> {
        let path = path.to_owned();
        self.offload(move |this| StorageProvider::directory_exists(this, &path)).await
    }

    async fn move_file(
        &self,
        path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let (path, new_path) = (path.to_owned(), new_path.to_owned());
        self.offload(move |this| StorageProvider::move_file(this, &path, &new_path, overwrite))
            .await
    }

    async fn copy_file(
        &self,
        path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let (path, new_path) = (path.to_owned(), new_path.to_owned());
        self.offload(move |this| StorageProvider::copy_file(this, &path, &new_path, overwrite))
            .await
    }

    async fn delete_file(&self, path: &str) -> Result<bool, StorageError> {
        let path = path.to_owned();
        self.offload(move |this| StorageProvider::delete_file(this, &path)).await
    }

    async fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        let path = path.to_owned();
        self.offload(move |this| StorageProvider::file_exists(this, &path)).await
    }

    async fn list_files(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let path = path.to_owned();
        self.offload(move |this| StorageProvider::list_files(this, &path)).await
    }

    async fn list_directories(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let path = path.to_owned();
        self.offload(move |this| StorageProvider::list_directories(this, &path)).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.offload(|this| StorageProvider::close(this)).await
    }
}
