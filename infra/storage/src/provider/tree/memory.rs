use super::NodeBackend;
use crate::error::StorageError;
use crate::node::{Node, NodeId, NodeKind};
use crate::tree::NodeSource;
use async_trait::async_trait;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    nodes: Vec<Node>,
    contents: FxHashMap<NodeId, Vec<u8>>,
}

impl State {
    fn get(&self, id: &NodeId) -> Result<&Node, StorageError> {
        self.nodes
            .iter()
            .find(|node| node.id == *id)
            .ok_or_else(|| StorageError::backend(format!("unknown node '{id}'")))
    }

    fn get_mut(&mut self, id: &NodeId) -> Result<&mut Node, StorageError> {
        self.nodes
            .iter_mut()
            .find(|node| node.id == *id)
            .ok_or_else(|| StorageError::backend(format!("unknown node '{id}'")))
    }

    fn require_container(&self, id: &NodeId) -> Result<(), StorageError> {
        let kind = self.get(id)?.kind;
        if kind.is_container() || kind.is_hidden() {
            Ok(())
        } else {
            Err(StorageError::type_mismatch(format!("node '{id}' cannot hold children")))
        }
    }

    /// Every node below `id`, parents before children.
    fn descendants(&self, id: &NodeId) -> Vec<Node> {
        let mut found = Vec::new();
        let mut frontier = vec![id.clone()];
        while let Some(parent) = frontier.pop() {
            for node in self.nodes.iter().filter(|node| node.is_child_of(&parent)) {
                frontier.push(node.id.clone());
                found.push(node.clone());
            }
        }
        found
    }
}

/// An in-process tree backend.
///
/// Starts with a root, a trash and an inbox node. Deleting moves a node into the
/// trash, the way hosted tree stores usually behave. Listing counters, artificial
/// latency and failure injection make cache behaviour observable in tests.
#[derive(Debug)]
pub struct MemoryNodeBackend {
    state: Mutex<State>,
    next_id: AtomicU64,
    latency: Option<Duration>,
    listing_failure: Mutex<Option<String>>,
    full_listings: AtomicUsize,
    scoped_listings: AtomicUsize,
    child_listings: AtomicUsize,
    logged_out: AtomicBool,
}

impl Default for MemoryNodeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNodeBackend {
    pub const ROOT_ID: &'static str = "root";
    pub const TRASH_ID: &'static str = "trash";
    pub const INBOX_ID: &'static str = "inbox";

    #[must_use]
    pub fn new() -> Self {
        let nodes = vec![
            Node::new(Self::ROOT_ID, None, "Cloud Drive", NodeKind::Root),
            Node::new(Self::TRASH_ID, None, "Rubbish Bin", NodeKind::Trash),
            Node::new(Self::INBOX_ID, None, "Inbox", NodeKind::Inbox),
        ];
        Self {
            state: Mutex::new(State { nodes, contents: FxHashMap::default() }),
            next_id: AtomicU64::new(1),
            latency: None,
            listing_failure: Mutex::new(None),
            full_listings: AtomicUsize::new(0),
            scoped_listings: AtomicUsize::new(0),
            child_listings: AtomicUsize::new(0),
            logged_out: AtomicBool::new(false),
        }
    }

    /// Every call sleeps for `latency` first.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[must_use]
    pub fn root_id(&self) -> NodeId {
        NodeId::new(Self::ROOT_ID)
    }

    #[must_use]
    pub fn trash_id(&self) -> NodeId {
        NodeId::new(Self::TRASH_ID)
    }

    /// Makes every node listing fail with `message` until cleared with `None`.
    pub fn fail_listings(&self, message: Option<&str>) {
        *self.listing_failure.lock() = message.map(str::to_owned);
    }

    /// Number of whole-tree listings served.
    #[must_use]
    pub fn full_listings(&self) -> usize {
        self.full_listings.load(Ordering::SeqCst)
    }

    /// Number of subtree listings served.
    #[must_use]
    pub fn scoped_listings(&self) -> usize {
        self.scoped_listings.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn child_listings(&self) -> usize {
        self.child_listings.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    /// A copy of every node, trash and inbox included.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        self.state.lock().nodes.clone()
    }

    fn fresh_id(&self) -> NodeId {
        NodeId::new(format!("n{}", self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    fn pause_blocking(&self) {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn listing(&self, under: Option<&NodeId>) -> Result<Vec<Node>, StorageError> {
        if let Some(message) = self.listing_failure.lock().clone() {
            return Err(StorageError::backend(message));
        }
        let state = self.state.lock();
        match under {
            None => {
                self.full_listings.fetch_add(1, Ordering::SeqCst);
                Ok(state.nodes.clone())
            },
            Some(id) => {
                state.get(id)?;
                self.scoped_listings.fetch_add(1, Ordering::SeqCst);
                Ok(state.descendants(id))
            },
        }
    }

    fn lookup(&self, id: &NodeId) -> Option<Node> {
        self.state.lock().get(id).ok().cloned()
    }

    fn children(&self, parent: &NodeId) -> Result<Vec<Node>, StorageError> {
        let state = self.state.lock();
        state.get(parent)?;
        self.child_listings.fetch_add(1, Ordering::SeqCst);
        Ok(state.nodes.iter().filter(|node| node.is_child_of(parent)).cloned().collect())
    }

    fn insert(&self, name: &str, parent: &NodeId, kind: NodeKind, data: Option<&[u8]>) -> Result<Node, StorageError> {
        let mut state = self.state.lock();
        state.require_container(parent)?;
        let size = data.map_or(0, |data| data.len() as u64);
        let node = Node::new(self.fresh_id(), Some(parent.clone()), name, kind).with_size(size);
        if let Some(data) = data {
            state.contents.insert(node.id.clone(), data.to_vec());
        }
        state.nodes.push(node.clone());
        Ok(node)
    }

    fn content(&self, id: &NodeId) -> Result<Vec<u8>, StorageError> {
        let state = self.state.lock();
        if state.get(id)?.kind != NodeKind::File {
            return Err(StorageError::type_mismatch(format!("node '{id}' is not a file")));
        }
        Ok(state.contents.get(id).cloned().unwrap_or_default())
    }

    fn trash(&self, id: &NodeId) -> Result<(), StorageError> {
        let trash = self.trash_id();
        let mut state = self.state.lock();
        if state.get(id)?.parent_id.is_none() {
            return Err(StorageError::invalid_argument(format!("top-level node '{id}' cannot be deleted")));
        }
        state.get_mut(id)?.parent_id = Some(trash);
        Ok(())
    }

    fn reparent(&self, id: &NodeId, new_parent: &NodeId) -> Result<Node, StorageError> {
        let mut state = self.state.lock();
        state.require_container(new_parent)?;
        if id == new_parent || state.descendants(id).iter().any(|node| node.id == *new_parent) {
            return Err(StorageError::invalid_argument("a node cannot move below itself"));
        }
        let node = state.get_mut(id)?;
        node.parent_id = Some(new_parent.clone());
        Ok(node.clone())
    }

    fn retitle(&self, id: &NodeId, name: &str) -> Result<Node, StorageError> {
        let mut state = self.state.lock();
        let node = state.get_mut(id)?;
        name.clone_into(&mut node.name);
        Ok(node.clone())
    }
}

#[async_trait]
impl NodeSource for MemoryNodeBackend {
    fn list_nodes_blocking(&self, under: Option<&NodeId>) -> Result<Vec<Node>, StorageError> {
        self.pause_blocking();
        self.listing(under)
    }

    async fn list_nodes(&self, under: Option<&NodeId>) -> Result<Vec<Node>, StorageError> {
        self.pause().await;
        self.listing(under)
    }

    fn node_blocking(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        self.pause_blocking();
        Ok(self.lookup(id))
    }

    async fn node(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        self.pause().await;
        Ok(self.lookup(id))
    }
}

#[async_trait]
impl NodeBackend for MemoryNodeBackend {
    fn list_children_blocking(&self, parent: &NodeId) -> Result<Vec<Node>, StorageError> {
        self.pause_blocking();
        self.children(parent)
    }

    async fn list_children(&self, parent: &NodeId) -> Result<Vec<Node>, StorageError> {
        self.pause().await;
        self.children(parent)
    }

    fn create_folder_blocking(&self, name: &str, parent: &NodeId) -> Result<Node, StorageError> {
        self.pause_blocking();
        self.insert(name, parent, NodeKind::Directory, None)
    }

    async fn create_folder(&self, name: &str, parent: &NodeId) -> Result<Node, StorageError> {
        self.pause().await;
        self.insert(name, parent, NodeKind::Directory, None)
    }

    fn upload_blocking(
        &self,
        name: &str,
        parent: &NodeId,
        data: &[u8],
    ) -> Result<Node, StorageError> {
        self.pause_blocking();
        self.insert(name, parent, NodeKind::File, Some(data))
    }

    async fn upload(&self, name: &str, parent: &NodeId, data: &[u8]) -> Result<Node, StorageError> {
        self.pause().await;
        self.insert(name, parent, NodeKind::File, Some(data))
    }

    fn download_blocking(&self, id: &NodeId) -> Result<Vec<u8>, StorageError> {
        self.pause_blocking();
        self.content(id)
    }

    async fn download(&self, id: &NodeId) -> Result<Vec<u8>, StorageError> {
        self.pause().await;
        self.content(id)
    }

    fn delete_blocking(&self, id: &NodeId) -> Result<(), StorageError> {
        self.pause_blocking();
        self.trash(id)
    }

    async fn delete(&self, id: &NodeId) -> Result<(), StorageError> {
        self.pause().await;
        self.trash(id)
    }

    fn move_node_blocking(&self, id: &NodeId, new_parent: &NodeId) -> Result<Node, StorageError> {
        self.pause_blocking();
        self.reparent(id, new_parent)
    }

    async fn move_node(&self, id: &NodeId, new_parent: &NodeId) -> Result<Node, StorageError> {
        self.pause().await;
        self.reparent(id, new_parent)
    }

    fn rename_blocking(&self, id: &NodeId, name: &str) -> Result<Node, StorageError> {
        self.pause_blocking();
        self.retitle(id, name)
    }

    async fn rename(&self, id: &NodeId, name: &str) -> Result<Node, StorageError> {
        self.pause().await;
        self.retitle(id, name)
    }

    fn logout_blocking(&self) -> Result<(), StorageError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self) -> Result<(), StorageError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }
}
