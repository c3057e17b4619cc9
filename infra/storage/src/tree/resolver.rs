//! Path to node resolution against a [`Snapshot`].
//!
//! Resolution is a pure function of its inputs: no cache access, no I/O. Absence is
//! reported as `None`; callers decide whether that is an error.

use crate::node::{Node, NodeId, NodeKind};
use crate::path;
use crate::tree::Snapshot;

/// Walks `path` down from `root`, one segment at a time.
///
/// * Both `/` and `\` separate segments; empty segments are ignored.
/// * An empty or whitespace-only path resolves to `root` itself.
/// * Names match exactly. If a parent holds two children with the same name the
///   first one in snapshot order is taken.
///
/// ```rust
/// use depot_storage::{Node, NodeId, NodeKind};
/// use depot_storage::tree::{Snapshot, resolve};
///
/// let root = NodeId::from("root");
/// let nodes = vec![
///     Node::new("root", None, "", NodeKind::Root),
///     Node::new("d1", Some(root.clone()), "docs", NodeKind::Directory),
///     Node::new("f1", Some(NodeId::from("d1")), "a.txt", NodeKind::File),
/// ];
/// let snapshot = Snapshot::new(nodes, &root).unwrap();
///
/// let found = resolve(r"docs\a.txt", &snapshot, snapshot.root()).unwrap();
/// assert_eq!(found.id.as_str(), "f1");
/// assert!(resolve("docs/missing", &snapshot, snapshot.root()).is_none());
/// ```
#[must_use]
pub fn resolve<'s>(path: &str, snapshot: &'s Snapshot, root: &'s Node) -> Option<&'s Node> {
    path::segments(path.trim())
        .try_fold(root, |current, segment| snapshot.child(&current.id, segment))
}

/// Picks the effective root out of a raw backend listing.
///
/// A configured (scoped) root id wins; otherwise the first node of kind
/// [`NodeKind::Root`] is used.
#[must_use]
pub fn find_root<'n>(nodes: &'n [Node], configured: Option<&NodeId>) -> Option<&'n Node> {
    configured
        .and_then(|id| nodes.iter().find(|node| &node.id == id))
        .or_else(|| nodes.iter().find(|node| node.kind == NodeKind::Root))
}
