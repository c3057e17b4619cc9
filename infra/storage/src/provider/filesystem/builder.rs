use super::FileSystemStorageProvider;
use crate::config::FileSystemConfig;
use crate::error::{StorageError, StorageErrorExt};
use private::Sealed;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
struct Options {
    create: bool,
    delete_root_on_close: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { create: true, delete_root_on_close: false }
    }
}

#[derive(Debug, Default)]
pub struct NoRoot;
#[derive(Debug)]
pub struct WithRoot(PathBuf);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoRoot {}
impl Sealed for WithRoot {}

#[allow(private_bounds)]
#[derive(Debug, Default)]
pub struct FileSystemProviderBuilder<S: Sealed = NoRoot> {
    state: S,
    options: Options,
}

#[allow(private_bounds)]
impl<S: Sealed> FileSystemProviderBuilder<S> {
    #[must_use = "Sets whether a missing root directory is created on connect"]
    pub const fn create(mut self, enable: bool) -> Self {
        self.options.create = enable;
        self
    }

    #[must_use = "Sets whether close() removes the root directory"]
    pub const fn delete_root_on_close(mut self, enable: bool) -> Self {
        self.options.delete_root_on_close = enable;
        self
    }

    fn transition<N: Sealed>(self, state: N) -> FileSystemProviderBuilder<N> {
        FileSystemProviderBuilder { state, options: self.options }
    }
}

impl FileSystemProviderBuilder<NoRoot> {
    #[must_use = "Creates a new provider builder with default options"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "Sets the directory every provider path is relative to"]
    pub fn root(self, path: impl Into<PathBuf>) -> FileSystemProviderBuilder<WithRoot> {
        self.transition(WithRoot(path.into()))
    }

    /// Seeds a builder from deserialized settings.
    #[must_use]
    pub fn from_config(config: &FileSystemConfig) -> FileSystemProviderBuilder<WithRoot> {
        Self::new()
            .create(config.create)
            .delete_root_on_close(config.delete_root_on_close)
            .root(config.root.clone())
    }
}

impl FileSystemProviderBuilder<WithRoot> {
    /// Bootstraps the root, canonicalizes it and sweeps temp files orphaned by
    /// earlier crashes. A failed sweep is logged and does not fail the connect.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if:
    /// - The root does not exist and `create(false)` was set.
    /// - The process may not create or resolve the root.
    pub async fn connect(self) -> Result<FileSystemStorageProvider, StorageError> {
        let root = &self.state.0;

        if self.options.create {
            tokio::fs::create_dir_all(root)
                .await
                .context(format!("Failed to bootstrap provider root: {}", root.display()))?;
        }

        let canonical = tokio::fs::canonicalize(root)
            .await
            .context(format!("Failed to resolve provider root: {}", root.display()))?;
        info!(path = %canonical.display(), "Filesystem provider ready");

        let provider =
            FileSystemStorageProvider::from_parts(canonical, self.options.delete_root_on_close);
        provider.purge_tmp_async().await;
        Ok(provider)
    }

    /// Blocking counterpart of [`connect`](Self::connect).
    ///
    /// # Errors
    /// As [`connect`](Self::connect).
    pub fn connect_blocking(self) -> Result<FileSystemStorageProvider, StorageError> {
        let root = &self.state.0;

        if self.options.create {
            std::fs::create_dir_all(root)
                .context(format!("Failed to bootstrap provider root: {}", root.display()))?;
        }

        let canonical = root
            .canonicalize()
            .context(format!("Failed to resolve provider root: {}", root.display()))?;
        info!(path = %canonical.display(), "Filesystem provider ready");

        let provider =
            FileSystemStorageProvider::from_parts(canonical, self.options.delete_root_on_close);
        provider.purge_tmp();
        Ok(provider)
    }
}
