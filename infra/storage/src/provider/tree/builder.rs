use super::{NodeBackend, TreeStorageProvider};
use crate::config::TreeConfig;
use crate::error::StorageError;
use crate::node::NodeId;
use crate::tree::{DEFAULT_TTL, RootScope};
use private::Sealed;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub(super) struct Options {
    pub(super) scope: RootScope,
    pub(super) ttl: Duration,
    pub(super) release_backend_on_close: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { scope: RootScope::Backend, ttl: DEFAULT_TTL, release_backend_on_close: true }
    }
}

#[derive(Debug, Default)]
pub struct NoBackend;
pub struct WithBackend<B: ?Sized>(Arc<B>);

impl<B: ?Sized> fmt::Debug for WithBackend<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WithBackend")
    }
}

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoBackend {}
impl<B: ?Sized> Sealed for WithBackend<B> {}

#[allow(private_bounds)]
#[derive(Debug, Default)]
pub struct TreeProviderBuilder<S: Sealed = NoBackend> {
    state: S,
    options: Options,
}

#[allow(private_bounds)]
impl<S: Sealed> TreeProviderBuilder<S> {
    /// Scopes the provider to the directory at `path`. A blank path means the whole
    /// backend.
    #[must_use = "Sets the subtree the provider exposes"]
    pub fn root(mut self, path: impl AsRef<str>) -> Self {
        self.options.scope = RootScope::from_path(Some(path.as_ref()));
        self
    }

    /// Scopes the provider to the subtree under a known node.
    #[must_use = "Sets the subtree the provider exposes"]
    pub fn root_id(mut self, id: impl Into<NodeId>) -> Self {
        self.options.scope = RootScope::Id(id.into());
        self
    }

    #[must_use = "Sets how long a node tree snapshot stays fresh"]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = ttl;
        self
    }

    #[must_use = "Sets whether close() logs the backend out"]
    pub const fn release_backend_on_close(mut self, enable: bool) -> Self {
        self.options.release_backend_on_close = enable;
        self
    }

    /// Applies deserialized settings on top of what was set so far.
    #[must_use]
    pub fn config(mut self, config: &TreeConfig) -> Self {
        self.options.scope = config.scope();
        self.options.ttl = config.cache.ttl();
        self.options.release_backend_on_close = config.release_backend_on_close;
        self
    }

    fn transition<N: Sealed>(self, state: N) -> TreeProviderBuilder<N> {
        TreeProviderBuilder { state, options: self.options }
    }
}

impl TreeProviderBuilder<NoBackend> {
    #[must_use = "Creates a new provider builder with default options"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "Sets the backend the provider talks to"]
    pub fn backend<B>(self, backend: Arc<B>) -> TreeProviderBuilder<WithBackend<B>>
    where
        B: NodeBackend + ?Sized + 'static,
    {
        self.transition(WithBackend(backend))
    }
}

impl<B: NodeBackend + ?Sized + 'static> TreeProviderBuilder<WithBackend<B>> {
    /// Builds the provider without touching the backend; the first operation
    /// fetches the node tree.
    #[must_use]
    pub fn build(self) -> TreeStorageProvider<B> {
        TreeStorageProvider::from_parts(self.state.0, self.options, CancellationToken::new())
    }

    /// Builds the provider and takes the first snapshot, so a bad scope or a dead
    /// backend fails here instead of on first use.
    ///
    /// # Errors
    /// Backend failures, or [`StorageError::DirectoryNotFound`] /
    /// [`StorageError::TypeMismatch`] for an unusable scope.
    pub async fn connect(self) -> Result<TreeStorageProvider<B>, StorageError> {
        let provider = self.build();
        provider.cache().snapshot(true, provider.cancellation_token()).await?;
        Ok(provider)
    }

    /// Blocking counterpart of [`connect`](Self::connect).
    ///
    /// # Errors
    /// As [`connect`](Self::connect).
    pub fn connect_blocking(self) -> Result<TreeStorageProvider<B>, StorageError> {
        let provider = self.build();
        provider.cache().snapshot_blocking(true)?;
        Ok(provider)
    }
}
