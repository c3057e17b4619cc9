//! A provider over a tree-structured remote store.
//!
//! Paths are resolved against a cached [`Snapshot`] of the backend's node tree (see
//! [`NodeTreeCache`]); mutations go to the backend by node id and invalidate the
//! cache. Listings always ask the backend for the children of the resolved
//! directory, so they reflect the backend even while the snapshot is fresh.

mod backend;
mod builder;
mod memory;
mod plan;

pub use backend::NodeBackend;
pub use builder::{NoBackend, TreeProviderBuilder, WithBackend};
pub use memory::MemoryNodeBackend;

use crate::error::StorageError;
use crate::mode::FileMode;
use crate::node::Node;
use crate::path;
use crate::provider::upload::UploadStream;
use crate::provider::{AsyncStorageProvider, EntryKind, StorageProvider, child_path};
use crate::stream::{MemoryStream, Stream};
use crate::tree::{NodeTreeCache, RootScope, Snapshot};
use async_trait::async_trait;
use builder::Options;
use plan::{Placement, Relocation};
use std::fmt;
use std::future::Future;
use std::io::Read;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The shared state of a [`TreeStorageProvider`].
pub struct TreeInner<B: ?Sized> {
    backend: Arc<B>,
    cache: NodeTreeCache<B>,
    root_label: Option<String>,
    release_backend_on_close: bool,
    cancel: CancellationToken,
    closed: AtomicBool,
}

/// Cheaply cloneable handle to a tree-backed provider.
///
/// ```rust
/// use depot_storage::{FileMode, MemoryNodeBackend, StorageProvider, TreeStorageProvider};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), depot_storage::StorageError> {
/// let provider = TreeStorageProvider::builder()
///     .backend(Arc::new(MemoryNodeBackend::new()))
///     .build();
///
/// provider.create_directory("reports")?;
/// provider.write_data("reports/q3.csv", FileMode::CreateNew, b"revenue,42")?;
/// assert!(provider.file_exists(r"reports\q3.csv")?);
/// assert_eq!(provider.list_files("reports")?, ["reports/q3.csv"]);
/// # Ok(())
/// # }
/// ```
pub struct TreeStorageProvider<B: ?Sized> {
    inner: Arc<TreeInner<B>>,
}

impl<B: ?Sized> Clone for TreeStorageProvider<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B: ?Sized> Deref for TreeStorageProvider<B> {
    type Target = TreeInner<B>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<B: ?Sized> fmt::Debug for TreeStorageProvider<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeStorageProvider")
            .field("root", &self.root_label)
            .field("release_backend_on_close", &self.release_backend_on_close)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TreeStorageProvider<dyn NodeBackend> {
    #[must_use = "The provider is not usable until you call .build() or .connect()"]
    pub fn builder() -> TreeProviderBuilder {
        TreeProviderBuilder::new()
    }
}

impl<B: NodeBackend + ?Sized + 'static> TreeStorageProvider<B> {
    pub(crate) const NAME: &'static str = "tree";

    fn from_parts(backend: Arc<B>, options: Options, cancel: CancellationToken) -> Self {
        let root_label = match &options.scope {
            RootScope::Backend => None,
            RootScope::Path(path) => Some(path.clone()),
            RootScope::Id(id) => Some(id.to_string()),
        };
        let cache = NodeTreeCache::new(Arc::clone(&backend), options.scope, options.ttl);
        info!(
            root = root_label.as_deref().unwrap_or(""),
            ttl_secs = options.ttl.as_secs(),
            "Tree provider ready"
        );
        Self {
            inner: Arc::new(TreeInner {
                backend,
                cache,
                root_label,
                release_backend_on_close: options.release_backend_on_close,
                cancel,
                closed: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    #[must_use]
    pub fn cache(&self) -> &NodeTreeCache<B> {
        &self.cache
    }

    /// Cancelled by [`close`](StorageProvider::close); every later operation fails
    /// with [`StorageError::Cancelled`].
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The node at `path`, if any.
    ///
    /// # Errors
    /// Snapshot refresh failures.
    pub fn node_blocking(&self, path: &str) -> Result<Option<Node>, StorageError> {
        Ok(self.snapshot_blocking()?.resolve(path).cloned())
    }

    /// # Errors
    /// Snapshot refresh failures, [`StorageError::Cancelled`].
    pub async fn node(&self, path: &str) -> Result<Option<Node>, StorageError> {
        Ok(self.snapshot().await?.resolve(path).cloned())
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.cancel.is_cancelled() { Err(StorageError::cancelled()) } else { Ok(()) }
    }

    fn snapshot_blocking(&self) -> Result<Arc<Snapshot>, StorageError> {
        self.ensure_open()?;
        self.cache.snapshot_blocking(false)
    }

    async fn snapshot(&self) -> Result<Arc<Snapshot>, StorageError> {
        self.cache.snapshot(false, &self.cancel).await
    }

    /// Races a backend call against the provider's token.
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, StorageError>> + Send,
    ) -> Result<T, StorageError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(StorageError::cancelled()),
            result = call => result,
        }
    }

    /// Every mutation, successful or not, leaves the cache stale.
    fn settle<T>(&self, result: Result<T, StorageError>) -> Result<T, StorageError> {
        self.cache.invalidate();
        result
    }

    /// Uploads first and removes the replaced file after, so a failed upload never
    /// loses the old content.
    fn store_blocking(&self, target: &Placement, data: &[u8]) -> Result<(), StorageError> {
        let uploaded = self.backend.upload_blocking(&target.name, &target.parent, data)?;
        if let Some(old) = &target.replaces {
            self.backend.delete_blocking(old)?;
        }
        debug!(node = %uploaded.id, bytes = data.len(), "Tree upload finished");
        Ok(())
    }

    async fn store(&self, target: &Placement, data: &[u8]) -> Result<(), StorageError> {
        let uploaded =
            self.guarded(self.backend.upload(&target.name, &target.parent, data)).await?;
        if let Some(old) = &target.replaces {
            self.guarded(self.backend.delete(old)).await?;
        }
        debug!(node = %uploaded.id, bytes = data.len(), "Tree upload finished");
        Ok(())
    }

    /// Moves (or copies) the source into place before removing the replaced file,
    /// so a failed move leaves the destination intact.
    fn relocate_blocking(&self, plan: &Relocation, keep_source: bool) -> Result<(), StorageError> {
        let target = &plan.target;
        if keep_source {
            let data = self.backend.download_blocking(&plan.source.id)?;
            return self.store_blocking(target, &data);
        }
        let mut node = plan.source.clone();
        if !node.is_child_of(&target.parent) {
            node = self.backend.move_node_blocking(&node.id, &target.parent)?;
        }
        if node.name != target.name {
            self.backend.rename_blocking(&node.id, &target.name)?;
        }
        if let Some(old) = &target.replaces {
            self.backend.delete_blocking(old)?;
        }
        debug!(node = %node.id, to = %target.name, "Tree node moved");
        Ok(())
    }

    async fn relocate(&self, plan: &Relocation, keep_source: bool) -> Result<(), StorageError> {
        let target = &plan.target;
        if keep_source {
            let data = self.guarded(self.backend.download(&plan.source.id)).await?;
            return self.store(target, &data).await;
        }
        let mut node = plan.source.clone();
        if !node.is_child_of(&target.parent) {
            node = self.guarded(self.backend.move_node(&node.id, &target.parent)).await?;
        }
        if node.name != target.name {
            self.guarded(self.backend.rename(&node.id, &target.name)).await?;
        }
        if let Some(old) = &target.replaces {
            self.guarded(self.backend.delete(old)).await?;
        }
        debug!(node = %node.id, to = %target.name, "Tree node moved");
        Ok(())
    }

    fn select(path: &str, children: Vec<Node>, wanted: EntryKind) -> Vec<String> {
        children
            .into_iter()
            .filter(|node| !node.kind.is_hidden() && plan::entry_kind(Some(node)) == Some(wanted))
            .map(|node| child_path(path, &node.name))
            .collect()
    }

    fn list_blocking(&self, path: &str, wanted: EntryKind) -> Result<Vec<String>, StorageError> {
        let dir = plan::listing(&*self.snapshot_blocking()?, path)?;
        Ok(Self::select(path, self.backend.list_children_blocking(&dir)?, wanted))
    }

    async fn list(&self, path: &str, wanted: EntryKind) -> Result<Vec<String>, StorageError> {
        let dir = plan::listing(&*self.snapshot().await?, path)?;
        let children = self.guarded(self.backend.list_children(&dir)).await?;
        Ok(Self::select(path, children, wanted))
    }

    /// The stream commits through the blocking backend forms on close or drop.
    ///
    /// Inside a multi-threaded runtime the commit runs under `block_in_place`, so the
    /// worker hands its other tasks off first. A current-thread runtime commits
    /// inline and stalls until the backend answers.
    fn upload_stream(&self, path: &str, target: Placement) -> Box<dyn Stream> {
        let this = self.clone();
        Box::new(UploadStream::new(
            path::normalize(path).into_owned(),
            Box::new(move |data: &[u8]| {
                off_worker(|| {
                    this.ensure_open()?;
                    let stored = this.store_blocking(&target, data);
                    this.settle(stored)
                })
            }),
        ))
    }
}

fn off_worker<T>(commit: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(commit)
        },
        _ => commit(),
    }
}

impl<B: NodeBackend + ?Sized + 'static> StorageProvider for TreeStorageProvider<B> {
    fn provider(&self) -> &'static str {
        Self::NAME
    }

    fn root(&self) -> Option<&str> {
        self.root_label.as_deref()
    }

    fn prepare_path(&self, path: &str) -> Result<String, StorageError> {
        Ok(path::normalize(path).into_owned())
    }

    fn write_data(&self, path: &str, mode: FileMode, data: &[u8]) -> Result<(), StorageError> {
        let target = plan::write(&*self.snapshot_blocking()?, path, mode)?;
        let stored = self.store_blocking(&target, data);
        self.settle(stored)
    }

    fn write_from(
        &self,
        path: &str,
        mode: FileMode,
        source: &mut dyn Read,
    ) -> Result<u64, StorageError> {
        let target = plan::write(&*self.snapshot_blocking()?, path, mode)?;
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        let stored = self.store_blocking(&target, &data);
        self.settle(stored).map(|()| data.len() as u64)
    }

    fn read_stream(&self, path: &str) -> Result<Box<dyn Stream>, StorageError> {
        let id = plan::read(&*self.snapshot_blocking()?, path)?;
        let data = self.backend.download_blocking(&id)?;
        Ok(Box::new(MemoryStream::read_only(data)))
    }

    fn write_stream(&self, path: &str, mode: FileMode) -> Result<Box<dyn Stream>, StorageError> {
        let target = plan::write(&*self.snapshot_blocking()?, path, mode)?;
        Ok(self.upload_stream(path, target))
    }

    fn delete_directory(&self, path: &str, recursive: bool) -> Result<bool, StorageError> {
        let Some(id) = plan::delete_directory(&*self.snapshot_blocking()?, path, recursive)? else {
            return Ok(false);
        };
        let deleted = self.backend.delete_blocking(&id);
        self.settle(deleted).map(|()| true)
    }

    fn create_directory(&self, path: &str) -> Result<bool, StorageError> {
        let Some((parent, name)) = plan::create_directory(&*self.snapshot_blocking()?, path)? else {
            return Ok(false);
        };
        let created = self.backend.create_folder_blocking(&name, &parent);
        self.settle(created).map(|_| true)
    }

    fn directory_exists(&self, path: &str) -> Result<bool, StorageError> {
        let snapshot = self.snapshot_blocking()?;
        Ok(plan::entry_kind(snapshot.resolve(path)) == Some(EntryKind::Directory))
    }

    fn move_file(&self, path: &str, new_path: &str, overwrite: bool) -> Result<(), StorageError> {
        let plan = plan::relocate(&*self.snapshot_blocking()?, path, new_path, overwrite)?;
        let moved = self.relocate_blocking(&plan, false);
        self.settle(moved)
    }

    fn copy_file(&self, path: &str, new_path: &str, overwrite: bool) -> Result<(), StorageError> {
        let plan = plan::relocate(&*self.snapshot_blocking()?, path, new_path, overwrite)?;
        let copied = self.relocate_blocking(&plan, true);
        self.settle(copied)
    }

    fn delete_file(&self, path: &str) -> Result<bool, StorageError> {
        let id = plan::delete_file(&*self.snapshot_blocking()?, path)?;
        let deleted = self.backend.delete_blocking(&id);
        self.settle(deleted).map(|()| true)
    }

    fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        let snapshot = self.snapshot_blocking()?;
        Ok(plan::entry_kind(snapshot.resolve(path)) == Some(EntryKind::File))
    }

    fn list_files(&self, path: &str) -> Result<Vec<String>, StorageError> {
        self.list_blocking(path, EntryKind::File)
    }

    fn list_directories(&self, path: &str) -> Result<Vec<String>, StorageError> {
        self.list_blocking(path, EntryKind::Directory)
    }

    fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.cancel.cancel();
        if self.release_backend_on_close {
            self.backend.logout_blocking()?;
        }
        info!(released = self.release_backend_on_close, "Tree provider closed");
        Ok(())
    }
}

#[async_trait]
impl<B: NodeBackend + ?Sized + 'static> AsyncStorageProvider for TreeStorageProvider<B> {
    fn provider(&self) -> &'static str {
        Self::NAME
    }

    fn root(&self) -> Option<&str> {
        self.root_label.as_deref()
    }

    fn prepare_path(&self, path: &str) -> Result<String, StorageError> {
        Ok(path::normalize(path).into_owned())
    }

    async fn write_data(&self, path: &str, mode: FileMode, data: &[u8]) -> Result<(), StorageError> {
        let target = plan::write(&*self.snapshot().await?, path, mode)?;
        let stored = self.store(&target, data).await;
        self.settle(stored)
    }

    async fn write_from(
        &self,
        path: &str,
        mode: FileMode,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, StorageError> {
        let target = plan::write(&*self.snapshot().await?, path, mode)?;
        let mut data = Vec::new();
        self.guarded(async { source.read_to_end(&mut data).await.map_err(StorageError::from) })
            .await?;
        let stored = self.store(&target, &data).await;
        self.settle(stored).map(|()| data.len() as u64)
    }

    async fn read_stream(&self, path: &str) -> Result<Box<dyn Stream>, StorageError> {
        let id = plan::read(&*self.snapshot().await?, path)?;
        let data = self.guarded(self.backend.download(&id)).await?;
        Ok(Box::new(MemoryStream::read_only(data)))
    }

    /// Mode rules are checked now. The upload happens when the stream is closed or
    /// dropped, through the backend's blocking forms.
    async fn write_stream(
        &self,
        path: &str,
        mode: FileMode,
    ) -> Result<Box<dyn Stream>, StorageError> {
        let target = plan::write(&*self.snapshot().await?, path, mode)?;
        Ok(self.upload_stream(path, target))
    }

    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<bool, StorageError> {
        let Some(id) = plan::delete_directory(&*self.snapshot().await?, path, recursive)? else {
            return Ok(false);
        };
        let deleted = self.guarded(self.backend.delete(&id)).await;
        self.settle(deleted).map(|()| true)
    }

    async fn create_directory(&self, path: &str) -> Result<bool, StorageError> {
        let Some((parent, name)) = plan::create_directory(&*self.snapshot().await?, path)? else {
            return Ok(false);
        };
        let created = self.guarded(self.backend.create_folder(&name, &parent)).await;
        self.settle(created).map(|_| true)
    }

    async fn directory_exists(&self, path: &str) -> Result<bool, StorageError> {
        let snapshot = self.snapshot().await?;
        Ok(plan::entry_kind(snapshot.resolve(path)) == Some(EntryKind::Directory))
    }

    async fn move_file(
        &self,
        path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let plan = plan::relocate(&*self.snapshot().await?, path, new_path, overwrite)?;
        let moved = self.relocate(&plan, false).await;
        self.settle(moved)
    }

    async fn copy_file(
        &self,
        path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let plan = plan::relocate(&*self.snapshot().await?, path, new_path, overwrite)?;
        let copied = self.relocate(&plan, true).await;
        self.settle(copied)
    }

    async fn delete_file(&self, path: &str) -> Result<bool, StorageError> {
        let id = plan::delete_file(&*self.snapshot().await?, path)?;
        let deleted = self.guarded(self.backend.delete(&id)).await;
        self.settle(deleted).map(|()| true)
    }

    async fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        let snapshot = self.snapshot().await?;
        Ok(plan::entry_kind(snapshot.resolve(path)) == Some(EntryKind::File))
    }

    async fn list_files(&self, path: &str) -> Result<Vec<String>, StorageError> {
        self.list(path, EntryKind::File).await
    }

    async fn list_directories(&self, path: &str) -> Result<Vec<String>, StorageError> {
        self.list(path, EntryKind::Directory).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.cancel.cancel();
        if self.release_backend_on_close {
            self.backend.logout().await?;
        }
        info!(released = self.release_backend_on_close, "Tree provider closed");
        Ok(())
    }
}
