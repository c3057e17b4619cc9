//! A provider over a local directory tree.
//!
//! Every caller path is sandboxed below the canonical root: absolute paths are
//! treated as root-relative, `..` may not climb above the root and symlinks may not
//! lead out of it. Whole-file writes go through the atomic swap pattern (unique temp
//! file, `fsync`, rename, directory sync), so a crash never leaves a torn file behind.

mod blocking;
mod builder;
mod maintenance;
mod nonblocking;
mod sandbox;

pub use builder::{FileSystemProviderBuilder, NoRoot, WithRoot};

use crate::error::StorageError;
use crate::provider::{EntryKind, child_path};
use std::fs::Metadata;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The shared state of a [`FileSystemStorageProvider`].
#[derive(Debug)]
pub struct FileSystemInner {
    /// Canonical physical root; every resolved path lives below it.
    pub(crate) root: PathBuf,
    root_display: String,
    delete_root_on_close: bool,
    pub(crate) tmp_counter: AtomicU64,
    closed: AtomicBool,
}

/// Cheaply cloneable handle to a sandboxed directory.
///
/// ```rust
/// use depot_storage::{FileMode, FileSystemStorageProvider, StorageProvider};
///
/// # fn main() -> Result<(), depot_storage::StorageError> {
/// # let tmp = tempfile::tempdir().unwrap();
/// let provider = FileSystemStorageProvider::builder()
///     .root(tmp.path().join("depot"))
///     .connect_blocking()?;
///
/// provider.create_directory("docs")?;
/// provider.write_data("docs/readme.txt", FileMode::CreateNew, b"hello")?;
/// assert_eq!(provider.read_data("/docs/readme.txt")?, b"hello");
/// assert_eq!(provider.list_files("docs")?, ["docs/readme.txt"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemStorageProvider {
    inner: Arc<FileSystemInner>,
}

impl Deref for FileSystemStorageProvider {
    type Target = FileSystemInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FileSystemStorageProvider {
    pub(crate) const NAME: &'static str = "filesystem";

    #[must_use = "The provider is not usable until you call .connect()"]
    pub fn builder() -> FileSystemProviderBuilder {
        FileSystemProviderBuilder::new()
    }

    pub(crate) fn from_parts(root: PathBuf, delete_root_on_close: bool) -> Self {
        let root_display = root.display().to_string();
        Self {
            inner: Arc::new(FileSystemInner {
                root,
                root_display,
                delete_root_on_close,
                tmp_counter: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The canonical physical root.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// `true` once [`close`](crate::StorageProvider::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Maps a provider path to its physical location inside the sandbox.
    ///
    /// # Errors
    /// [`StorageError::PathTraversalAttempt`] when the path would escape the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        sandbox::resolve(&self.root, path)
    }

    /// Removes temp files orphaned by crashed writers.
    pub fn purge_tmp(&self) {
        maintenance::purge_tmp(&self.root);
    }

    pub async fn purge_tmp_async(&self) {
        maintenance::purge_tmp_async(&self.root).await;
    }

    fn display_root(&self) -> &str {
        &self.root_display
    }

    fn is_root_dir(&self, resolved: &Path) -> bool {
        resolved == self.root
    }

    fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    fn root_deleted_on_close(&self) -> bool {
        self.delete_root_on_close
    }

    fn tmp_path(&self, target: &Path) -> PathBuf {
        maintenance::unique_tmp_path(target, &self.tmp_counter)
    }
}

fn entry_kind(meta: &Metadata) -> EntryKind {
    if meta.is_dir() { EntryKind::Directory } else { EntryKind::File }
}

/// Provider form of the parent of `path`, for error messages.
fn parent_label(path: &str) -> String {
    crate::path::split_parent(path).0
}

fn io_context(action: &str, path: &Path) -> String {
    format!("{action}: {}", path.display())
}

fn listing_name(name: &std::ffi::OsStr) -> Option<String> {
    let name = name.to_string_lossy();
    (!maintenance::is_tmp_name(&name)).then(|| name.into_owned())
}

fn listing(path: &str, mut names: Vec<String>) -> Vec<String> {
    names.sort_unstable();
    names.into_iter().map(|name| child_path(path, &name)).collect()
}
