use crate::error::StorageError;
use crate::node::{Node, NodeId};
use crate::tree::NodeSource;
use async_trait::async_trait;

/// Write side of a tree-structured backend.
///
/// Nodes are addressed by id only; path handling stays in the provider. Deleting a
/// container removes everything below it. Every operation comes in a blocking and
/// an async form with identical semantics.
#[async_trait]
pub trait NodeBackend: NodeSource {
    /// Direct children of `parent`.
    ///
    /// # Errors
    /// Transport or authentication failures, as [`StorageError::Backend`].
    fn list_children_blocking(&self, parent: &NodeId) -> Result<Vec<Node>, StorageError>;

    /// # Errors
    /// As [`NodeBackend::list_children_blocking`].
    async fn list_children(&self, parent: &NodeId) -> Result<Vec<Node>, StorageError>;

    /// Creates a directory named `name` under `parent` and returns it.
    ///
    /// # Errors
    /// Transport or authentication failures.
    fn create_folder_blocking(&self, name: &str, parent: &NodeId) -> Result<Node, StorageError>;

    /// # Errors
    /// As [`NodeBackend::create_folder_blocking`].
    async fn create_folder(&self, name: &str, parent: &NodeId) -> Result<Node, StorageError>;

    /// Stores `data` as a new file named `name` under `parent`.
    ///
    /// # Errors
    /// Transport or authentication failures.
    fn upload_blocking(
        &self,
        name: &str,
        parent: &NodeId,
        data: &[u8],
    ) -> Result<Node, StorageError>;

    /// # Errors
    /// As [`NodeBackend::upload_blocking`].
    async fn upload(&self, name: &str, parent: &NodeId, data: &[u8]) -> Result<Node, StorageError>;

    /// # Errors
    /// Transport failures, or [`StorageError::FileNotFound`] for an unknown id.
    fn download_blocking(&self, id: &NodeId) -> Result<Vec<u8>, StorageError>;

    /// # Errors
    /// As [`NodeBackend::download_blocking`].
    async fn download(&self, id: &NodeId) -> Result<Vec<u8>, StorageError>;

    /// # Errors
    /// Transport or authentication failures.
    fn delete_blocking(&self, id: &NodeId) -> Result<(), StorageError>;

    /// # Errors
    /// As [`NodeBackend::delete_blocking`].
    async fn delete(&self, id: &NodeId) -> Result<(), StorageError>;

    /// Re-parents `id` under `new_parent`, keeping its name.
    ///
    /// # Errors
    /// Transport or authentication failures.
    fn move_node_blocking(&self, id: &NodeId, new_parent: &NodeId) -> Result<Node, StorageError>;

    /// # Errors
    /// As [`NodeBackend::move_node_blocking`].
    async fn move_node(&self, id: &NodeId, new_parent: &NodeId) -> Result<Node, StorageError>;

    /// # Errors
    /// Transport or authentication failures.
    fn rename_blocking(&self, id: &NodeId, name: &str) -> Result<Node, StorageError>;

    /// # Errors
    /// As [`NodeBackend::rename_blocking`].
    async fn rename(&self, id: &NodeId, name: &str) -> Result<Node, StorageError>;

    /// Ends the backend session.
    ///
    /// # Errors
    /// Transport failures.
    fn logout_blocking(&self) -> Result<(), StorageError>;

    /// # Errors
    /// As [`NodeBackend::logout_blocking`].
    async fn logout(&self) -> Result<(), StorageError>;
}
