use crate::node::{Node, NodeId};
use crate::tree::resolver;
use fxhash::FxHashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Immutable, point-in-time listing of a backend tree.
///
/// Nodes live in a flat arena in the order the backend returned them; lookups go
/// through index maps so that no node ever references another directly.
#[derive(Debug)]
pub struct Snapshot {
    nodes: Vec<Node>,
    by_id: FxHashMap<NodeId, usize>,
    /// First occurrence wins when a backend reports duplicate names under one parent.
    by_parent_name: FxHashMap<NodeId, FxHashMap<String, usize>>,
    children: FxHashMap<NodeId, Vec<usize>>,
    root: usize,
    captured_at: Instant,
}

impl Snapshot {
    /// Builds the indexes over `nodes`. Returns `None` when `root` is not part of them.
    #[must_use]
    pub fn new(nodes: Vec<Node>, root: &NodeId) -> Option<Self> {
        let mut by_id = FxHashMap::default();
        let mut by_parent_name: FxHashMap<NodeId, FxHashMap<String, usize>> =
            FxHashMap::default();
        let mut children: FxHashMap<NodeId, Vec<usize>> = FxHashMap::default();

        for (index, node) in nodes.iter().enumerate() {
            by_id.entry(node.id.clone()).or_insert(index);
            if let Some(parent) = &node.parent_id {
                by_parent_name
                    .entry(parent.clone())
                    .or_default()
                    .entry(node.name.clone())
                    .or_insert(index);
                children.entry(parent.clone()).or_default().push(index);
            }
        }

        let root = *by_id.get(root)?;
        Some(Self { nodes, by_id, by_parent_name, children, root, captured_at: Instant::now() })
    }

    /// The node paths are resolved from.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.nodes[self.root]
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.by_id.get(id).map(|&index| &self.nodes[index])
    }

    /// The child of `parent` called `name`, first in snapshot order on duplicates.
    #[must_use]
    pub fn child(&self, parent: &NodeId, name: &str) -> Option<&Node> {
        self.by_parent_name.get(parent)?.get(name).map(|&index| &self.nodes[index])
    }

    /// Direct children of `parent`, in snapshot order.
    pub fn children(&self, parent: &NodeId) -> impl Iterator<Item = &Node> {
        self.children.get(parent).into_iter().flatten().map(|&index| &self.nodes[index])
    }

    #[must_use]
    pub fn has_children(&self, parent: &NodeId) -> bool {
        self.children.get(parent).is_some_and(|c| !c.is_empty())
    }

    /// Resolves `path` from this snapshot's root.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Node> {
        resolver::resolve(path, self, self.root())
    }

    #[must_use]
    pub const fn captured_at(&self) -> Instant {
        self.captured_at
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn node(id: &str, parent: Option<&str>, name: &str, kind: NodeKind) -> Node {
        Node::new(id, parent.map(NodeId::from), name, kind)
    }

    #[test]
    fn snapshot_requires_its_root() {
        let nodes = vec![node("r", None, "", NodeKind::Root)];
        assert!(Snapshot::new(nodes.clone(), &NodeId::from("missing")).is_none());
        assert!(Snapshot::new(nodes, &NodeId::from("r")).is_some());
    }

    #[test]
    fn duplicate_names_keep_first_entry() {
        let nodes = vec![
            node("r", None, "", NodeKind::Root),
            node("a1", Some("r"), "a", NodeKind::Directory),
            node("a2", Some("r"), "a", NodeKind::File),
        ];
        let snapshot = Snapshot::new(nodes, &NodeId::from("r")).unwrap();
        assert_eq!(snapshot.child(&NodeId::from("r"), "a").unwrap().id.as_str(), "a1");
        assert_eq!(snapshot.children(&NodeId::from("r")).count(), 2);
    }
}
