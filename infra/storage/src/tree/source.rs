use crate::error::StorageError;
use crate::node::{Node, NodeId};
use async_trait::async_trait;

/// Read side of a tree-structured backend, as seen by [`NodeTreeCache`](crate::tree::NodeTreeCache).
///
/// Every operation comes in a blocking and an async form. Blocking forms must not be
/// called from inside an async runtime worker.
#[async_trait]
pub trait NodeSource: Send + Sync {
    /// With `None`, every node the backend holds (including trash and inbox).
    /// With `Some(id)`, every node below `id`, not including `id` itself.
    ///
    /// # Errors
    /// Returns [`StorageError::Backend`] on transport or authentication failure.
    fn list_nodes_blocking(&self, under: Option<&NodeId>) -> Result<Vec<Node>, StorageError>;

    /// Async form of [`NodeSource::list_nodes_blocking`].
    ///
    /// # Errors
    /// Returns [`StorageError::Backend`] on transport or authentication failure.
    async fn list_nodes(&self, under: Option<&NodeId>) -> Result<Vec<Node>, StorageError>;

    /// The record of a single node, `None` if the backend does not know it.
    ///
    /// # Errors
    /// Returns [`StorageError::Backend`] on transport or authentication failure.
    fn node_blocking(&self, id: &NodeId) -> Result<Option<Node>, StorageError>;

    /// Async form of [`NodeSource::node_blocking`].
    ///
    /// # Errors
    /// Returns [`StorageError::Backend`] on transport or authentication failure.
    async fn node(&self, id: &NodeId) -> Result<Option<Node>, StorageError>;
}
