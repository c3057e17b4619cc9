use crate::error::StorageError;
use crate::node::{Node, NodeId};
use crate::tree::resolver::find_root;
use crate::tree::{NodeSource, Snapshot};
use fxhash::{FxHashMap, FxHashSet};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long a snapshot stays fresh unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Which part of the backend tree a cache exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RootScope {
    /// The whole account, minus trash and inbox.
    #[default]
    Backend,
    /// The subtree under the directory at this path (resolved from the true root).
    Path(String),
    /// The subtree under this node.
    Id(NodeId),
}

impl RootScope {
    /// A blank path means the whole backend.
    #[must_use]
    pub fn from_path(root: Option<&str>) -> Self {
        match root.map(str::trim) {
            Some(path) if !crate::path::is_root(path) => Self::Path(path.to_owned()),
            _ => Self::Backend,
        }
    }
}

#[derive(Debug, Default)]
struct View {
    snapshot: Option<Arc<Snapshot>>,
    refreshed_at: Option<Instant>,
    epoch: u64,
}

/// State only touched while the refresh lock is held.
#[derive(Debug, Default)]
struct RefreshSlot {
    scoped_root: Option<NodeId>,
    last_failure: Option<String>,
}

/// TTL-bounded, single-flight snapshot cache over a [`NodeSource`].
///
/// Readers hit a lock-free-ish fast path (`parking_lot::RwLock` read) while the
/// snapshot is fresh. A stale snapshot is replaced by exactly one fetch no matter how
/// many callers notice at once: refreshes are serialised by one `tokio::sync::Mutex`
/// that both the blocking and the async entry points go through. Callers that queued
/// behind a refresh reuse its result, including its failure.
#[derive(Debug)]
pub struct NodeTreeCache<S: ?Sized> {
    source: Arc<S>,
    scope: RootScope,
    ttl: Duration,
    view: RwLock<View>,
    epoch: AtomicU64,
    attempts: AtomicU64,
    refreshes: AtomicU64,
    slot: tokio::sync::Mutex<RefreshSlot>,
}

impl<S: NodeSource + ?Sized> NodeTreeCache<S> {
    #[must_use]
    pub fn new(source: Arc<S>, scope: RootScope, ttl: Duration) -> Self {
        Self {
            source,
            scope,
            ttl,
            view: RwLock::new(View::default()),
            epoch: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
            slot: tokio::sync::Mutex::new(RefreshSlot::default()),
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub const fn scope(&self) -> &RootScope {
        &self.scope
    }

    #[must_use]
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Number of successful refreshes so far.
    #[must_use]
    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// The last snapshot taken, fresh or not.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.view.read().snapshot.clone()
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.fresh().is_some()
    }

    /// Marks the cache stale without fetching anything.
    ///
    /// A refresh already in flight still hands its snapshot to its own callers, but
    /// the cache stays stale afterwards.
    pub fn invalidate(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(epoch, "Node tree cache invalidated");
    }

    /// Returns a fresh snapshot, fetching one if needed.
    ///
    /// Must not be called from inside an async runtime worker.
    ///
    /// # Errors
    /// Propagates backend failures, including a failure of a concurrent refresh this
    /// call waited on. Returns [`StorageError::DirectoryNotFound`] or
    /// [`StorageError::TypeMismatch`] when a scoped root cannot be used.
    pub fn snapshot_blocking(&self, force: bool) -> Result<Arc<Snapshot>, StorageError> {
        if !force && let Some(snapshot) = self.fresh() {
            return Ok(snapshot);
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut slot = self.slot.blocking_lock();
        if let Some(outcome) = self.settled(&slot, seen, force) {
            return outcome;
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let started = Instant::now();
        let result = self.fetch_blocking(&mut slot);
        self.complete(&mut slot, epoch, started, result)
    }

    /// Async form of [`NodeTreeCache::snapshot_blocking`].
    ///
    /// Waiting for the refresh lock and the fetch itself both race `cancel`.
    /// Dropping the returned future has the same effect as cancelling it: the cache is
    /// left exactly as it was.
    ///
    /// # Errors
    /// As [`NodeTreeCache::snapshot_blocking`], plus [`StorageError::Cancelled`].
    pub async fn snapshot(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<Arc<Snapshot>, StorageError> {
        if cancel.is_cancelled() {
            return Err(StorageError::cancelled());
        }
        if !force && let Some(snapshot) = self.fresh() {
            return Ok(snapshot);
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut slot = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StorageError::cancelled()),
            slot = self.slot.lock() => slot,
        };
        if let Some(outcome) = self.settled(&slot, seen, force) {
            return outcome;
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StorageError::cancelled()),
            result = self.fetch(&mut slot) => result,
        };
        self.complete(&mut slot, epoch, started, result)
    }

    fn fresh(&self) -> Option<Arc<Snapshot>> {
        let view = self.view.read();
        let snapshot = view.snapshot.as_ref()?;
        let refreshed_at = view.refreshed_at?;
        let current_epoch = self.epoch.load(Ordering::Acquire);
        (view.epoch == current_epoch && refreshed_at.elapsed() <= self.ttl)
            .then(|| Arc::clone(snapshot))
    }

    /// Decides, with the refresh lock held, whether someone else already did the work.
    fn settled(
        &self,
        slot: &RefreshSlot,
        seen: u64,
        force: bool,
    ) -> Option<Result<Arc<Snapshot>, StorageError>> {
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(message) = &slot.last_failure {
                return Some(Err(StorageError::Backend {
                    message: message.clone().into(),
                    context: Some("concurrent node tree refresh failed".into()),
                }));
            }
            return self.fresh().map(Ok);
        }
        if force { None } else { self.fresh().map(Ok) }
    }

    fn complete(
        &self,
        slot: &mut RefreshSlot,
        epoch: u64,
        started: Instant,
        result: Result<Snapshot, StorageError>,
    ) -> Result<Arc<Snapshot>, StorageError> {
        let outcome = match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                {
                    let mut view = self.view.write();
                    view.snapshot = Some(Arc::clone(&snapshot));
                    view.refreshed_at = Some(snapshot.captured_at());
                    view.epoch = epoch;
                }
                slot.last_failure = None;
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                info!(
                    nodes = snapshot.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "Node tree refreshed"
                );
                Ok(snapshot)
            },
            Err(err) => {
                warn!(error = %err, "Node tree refresh failed");
                slot.last_failure = Some(err.to_string());
                Err(err)
            },
        };
        self.attempts.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    fn fetch_blocking(&self, slot: &mut RefreshSlot) -> Result<Snapshot, StorageError> {
        match &self.scope {
            RootScope::Backend => unscoped(self.source.list_nodes_blocking(None)?),
            RootScope::Id(id) => {
                let root = self
                    .source
                    .node_blocking(id)?
                    .ok_or_else(|| StorageError::directory_not_found(id.to_string()))?;
                let nodes = self.source.list_nodes_blocking(Some(&root.id))?;
                scoped(root, nodes)
            },
            RootScope::Path(path) => {
                let remembered = match &slot.scoped_root {
                    Some(id) => self.source.node_blocking(id)?,
                    None => None,
                };
                let root = match remembered {
                    Some(root) => root,
                    None => {
                        let full = unscoped(self.source.list_nodes_blocking(None)?)?;
                        let root = locate(&full, path)?;
                        slot.scoped_root = Some(root.id.clone());
                        root
                    },
                };
                let nodes = self.source.list_nodes_blocking(Some(&root.id))?;
                scoped(root, nodes)
            },
        }
    }

    async fn fetch(&self, slot: &mut RefreshSlot) -> Result<Snapshot, StorageError> {
        match &self.scope {
            RootScope::Backend => unscoped(self.source.list_nodes(None).await?),
            RootScope::Id(id) => {
                let root = self
                    .source
                    .node(id)
                    .await?
                    .ok_or_else(|| StorageError::directory_not_found(id.to_string()))?;
                let nodes = self.source.list_nodes(Some(&root.id)).await?;
                scoped(root, nodes)
            },
            RootScope::Path(path) => {
                let remembered = match &slot.scoped_root {
                    Some(id) => self.source.node(id).await?,
                    None => None,
                };
                let root = match remembered {
                    Some(root) => root,
                    None => {
                        let full = unscoped(self.source.list_nodes(None).await?)?;
                        let root = locate(&full, path)?;
                        slot.scoped_root = Some(root.id.clone());
                        root
                    },
                };
                let nodes = self.source.list_nodes(Some(&root.id)).await?;
                scoped(root, nodes)
            },
        }
    }
}

/// Full listing minus trash/inbox nodes and everything below them.
fn unscoped(nodes: Vec<Node>) -> Result<Snapshot, StorageError> {
    let root = find_root(&nodes, None)
        .map(|node| node.id.clone())
        .ok_or_else(|| StorageError::backend("listing contains no root node"))?;

    let mut children: FxHashMap<&NodeId, Vec<&NodeId>> = FxHashMap::default();
    for node in &nodes {
        if let Some(parent) = &node.parent_id {
            children.entry(parent).or_default().push(&node.id);
        }
    }

    let mut hidden: FxHashSet<NodeId> = FxHashSet::default();
    let mut pending: Vec<&NodeId> =
        nodes.iter().filter(|node| node.kind.is_hidden()).map(|node| &node.id).collect();
    while let Some(id) = pending.pop() {
        if hidden.insert(id.clone())
            && let Some(below) = children.get(id)
        {
            pending.extend(below.iter().copied());
        }
    }

    let visible: Vec<Node> = nodes.into_iter().filter(|node| !hidden.contains(&node.id)).collect();
    Snapshot::new(visible, &root).ok_or_else(|| StorageError::backend("root node is hidden"))
}

/// The subtree listing of `root` with `root` itself in front.
fn scoped(root: Node, nodes: Vec<Node>) -> Result<Snapshot, StorageError> {
    if !root.kind.is_container() {
        return Err(StorageError::type_mismatch(format!(
            "scoped root '{}' is a {:?}, not a directory",
            root.name, root.kind
        )));
    }
    let id = root.id.clone();
    let mut all = Vec::with_capacity(nodes.len() + 1);
    all.push(root);
    all.extend(nodes.into_iter().filter(|node| node.id != id && !node.kind.is_hidden()));
    Snapshot::new(all, &id).ok_or_else(|| StorageError::Internal {
        message: "scoped root missing from its own snapshot".into(),
        context: None,
    })
}

fn locate(full: &Snapshot, path: &str) -> Result<Node, StorageError> {
    let node = full
        .resolve(path)
        .ok_or_else(|| StorageError::directory_not_found(path.to_owned()))?;
    if node.kind.is_container() {
        Ok(node.clone())
    } else {
        Err(StorageError::type_mismatch(format!("root path '{path}' is not a directory")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Listing {
        nodes: Mutex<Vec<Node>>,
        listings: AtomicUsize,
        fail: Mutex<Option<&'static str>>,
    }

    impl Listing {
        fn with(nodes: Vec<Node>) -> Arc<Self> {
            Arc::new(Self { nodes: Mutex::new(nodes), ..Self::default() })
        }

        fn list(&self, under: Option<&NodeId>) -> Result<Vec<Node>, StorageError> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = *self.fail.lock() {
                return Err(StorageError::backend(message));
            }
            let nodes = self.nodes.lock().clone();
            Ok(match under {
                None => nodes,
                Some(id) => {
                    let mut out = Vec::new();
                    let mut frontier = vec![id.clone()];
                    while let Some(parent) = frontier.pop() {
                        for node in nodes.iter().filter(|n| n.is_child_of(&parent)) {
                            frontier.push(node.id.clone());
                            out.push(node.clone());
                        }
                    }
                    out
                },
            })
        }
    }

    #[async_trait]
    impl NodeSource for Listing {
        fn list_nodes_blocking(&self, under: Option<&NodeId>) -> Result<Vec<Node>, StorageError> {
            self.list(under)
        }

        async fn list_nodes(&self, under: Option<&NodeId>) -> Result<Vec<Node>, StorageError> {
            self.list(under)
        }

        fn node_blocking(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
            Ok(self.nodes.lock().iter().find(|n| &n.id == id).cloned())
        }

        async fn node(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
            self.node_blocking(id)
        }
    }

    fn account() -> Vec<Node> {
        let n = |id: &str, parent: Option<&str>, name: &str, kind| {
            Node::new(id, parent.map(NodeId::from), name, kind)
        };
        vec![
            n("root", None, "", NodeKind::Root),
            n("trash", None, "Rubbish", NodeKind::Trash),
            n("inbox", None, "Inbox", NodeKind::Inbox),
            n("docs", Some("root"), "docs", NodeKind::Directory),
            n("readme", Some("docs"), "readme.md", NodeKind::File),
            n("deleted", Some("trash"), "old", NodeKind::Directory),
            n("deeper", Some("deleted"), "older.txt", NodeKind::File),
            n("shared", Some("inbox"), "shared.txt", NodeKind::File),
        ]
    }

    #[test]
    fn unscoped_view_drops_hidden_subtrees() {
        let cache = NodeTreeCache::new(Listing::with(account()), RootScope::Backend, DEFAULT_TTL);
        let snapshot = cache.snapshot_blocking(false).unwrap();
        let ids: Vec<_> = snapshot.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["root", "docs", "readme"]);
        assert_eq!(snapshot.root().id.as_str(), "root");
    }

    #[test]
    fn fresh_snapshots_are_shared() {
        let source = Listing::with(account());
        let cache = NodeTreeCache::new(Arc::clone(&source), RootScope::Backend, DEFAULT_TTL);
        let first = cache.snapshot_blocking(false).unwrap();
        let second = cache.snapshot_blocking(false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.listings.load(Ordering::SeqCst), 1);
        assert_eq!(cache.refreshes(), 1);
    }

    #[test]
    fn invalidate_forces_a_fetch() {
        let source = Listing::with(account());
        let cache = NodeTreeCache::new(Arc::clone(&source), RootScope::Backend, DEFAULT_TTL);
        let first = cache.snapshot_blocking(false).unwrap();
        cache.invalidate();
        assert!(!cache.is_fresh());
        let second = cache.snapshot_blocking(false).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(source.listings.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_keeps_previous_snapshot() {
        let source = Listing::with(account());
        let cache = NodeTreeCache::new(Arc::clone(&source), RootScope::Backend, DEFAULT_TTL);
        let first = cache.snapshot_blocking(false).unwrap();

        *source.fail.lock() = Some("offline");
        let err = cache.snapshot_blocking(true).unwrap_err();
        assert!(matches!(err, StorageError::Backend { .. }));
        assert!(Arc::ptr_eq(&cache.current().unwrap(), &first));

        *source.fail.lock() = None;
        assert!(cache.snapshot_blocking(true).is_ok(), "next call retries");
    }

    #[test]
    fn path_scope_resolves_once_and_remembers_the_id() {
        let source = Listing::with(account());
        let cache = NodeTreeCache::new(
            Arc::clone(&source),
            RootScope::Path("docs".into()),
            DEFAULT_TTL,
        );
        let snapshot = cache.snapshot_blocking(false).unwrap();
        assert_eq!(snapshot.root().id.as_str(), "docs");
        assert_eq!(snapshot.resolve("readme.md").unwrap().id.as_str(), "readme");
        assert_eq!(source.listings.load(Ordering::SeqCst), 2);

        cache.snapshot_blocking(true).unwrap();
        assert_eq!(source.listings.load(Ordering::SeqCst), 3, "no second full listing");
    }

    #[test]
    fn scoped_root_must_be_a_directory() {
        let missing = NodeTreeCache::new(
            Listing::with(account()),
            RootScope::Path("nope".into()),
            DEFAULT_TTL,
        );
        assert!(matches!(
            missing.snapshot_blocking(false),
            Err(StorageError::DirectoryNotFound { .. })
        ));

        let file = NodeTreeCache::new(
            Listing::with(account()),
            RootScope::Id(NodeId::from("readme")),
            DEFAULT_TTL,
        );
        assert!(matches!(file.snapshot_blocking(false), Err(StorageError::TypeMismatch { .. })));
    }

    #[test]
    fn blank_root_path_means_whole_backend() {
        assert_eq!(RootScope::from_path(None), RootScope::Backend);
        assert_eq!(RootScope::from_path(Some(" / ")), RootScope::Backend);
        assert_eq!(RootScope::from_path(Some("a/b")), RootScope::Path("a/b".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_triggers_one_refresh() {
        let source = Listing::with(account());
        let cache =
            NodeTreeCache::new(Arc::clone(&source), RootScope::Backend, Duration::from_secs(5));
        let token = CancellationToken::new();

        let first = cache.snapshot(false, &token).await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(Arc::ptr_eq(&first, &cache.snapshot(false, &token).await.unwrap()));

        tokio::time::advance(Duration::from_secs(3)).await;
        let second = cache.snapshot(false, &token).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(source.listings.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_token_changes_nothing() {
        let source = Listing::with(account());
        let cache = NodeTreeCache::new(Arc::clone(&source), RootScope::Backend, DEFAULT_TTL);
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(cache.snapshot(false, &token).await, Err(StorageError::Cancelled { .. })));
        assert!(cache.current().is_none());
        assert_eq!(source.listings.load(Ordering::SeqCst), 0);
    }
}
