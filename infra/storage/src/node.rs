use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque identifier of a node in a tree-structured backend.
///
/// Cloning is a reference-count bump, so ids can be copied freely into indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Arc<str>);

impl NodeId {
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
    Root,
    Trash,
    Inbox,
}

impl NodeKind {
    /// Directories and the root can hold children.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Directory | Self::Root)
    }

    /// Trash and inbox subtrees are never part of a user-visible tree.
    #[must_use]
    pub const fn is_hidden(self) -> bool {
        matches!(self, Self::Trash | Self::Inbox)
    }
}

/// A backend tree entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// `None` only for top-level nodes (root, trash, inbox).
    pub parent_id: Option<NodeId>,
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub size: u64,
}

impl Node {
    #[must_use]
    pub fn new(
        id: impl Into<NodeId>,
        parent_id: Option<NodeId>,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> Self {
        Self { id: id.into(), parent_id, name: name.into(), kind, size: 0 }
    }

    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn is_child_of(&self, parent: &NodeId) -> bool {
        self.parent_id.as_ref() == Some(parent)
    }
}
