//! Validation of tree mutations against a snapshot, free of any I/O.
//!
//! Each planner returns the node ids the provider has to touch, or the error the
//! operation fails with before anything reaches the backend.

use crate::error::StorageError;
use crate::mode::FileMode;
use crate::node::{Node, NodeId};
use crate::path;
use crate::provider::{EntryKind, rules};
use crate::tree::Snapshot;

/// Where a new file lands and what it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placement {
    pub(crate) parent: NodeId,
    pub(crate) name: String,
    /// Existing entry at the destination, removed once the new file is in place.
    pub(crate) replaces: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relocation {
    pub(crate) source: Node,
    pub(crate) target: Placement,
}

pub(crate) fn entry_kind(node: Option<&Node>) -> Option<EntryKind> {
    node.map(|node| if node.kind.is_container() { EntryKind::Directory } else { EntryKind::File })
}

/// Resolves the parent of `path`, which must be a directory or the root.
fn placement(snapshot: &Snapshot, path: &str) -> Result<(NodeId, String), StorageError> {
    let (parent_path, name) = path::split_parent(path);
    let name = name.ok_or_else(|| StorageError::invalid_argument("path names no entry"))?;
    let parent = snapshot.resolve(&parent_path);
    rules::require_directory(&parent_path, entry_kind(parent))?;
    let parent = parent.map(|node| node.id.clone()).ok_or_else(|| {
        StorageError::directory_not_found(parent_path.clone())
    })?;
    Ok((parent, name.to_owned()))
}

fn existing_file(node: Option<&Node>) -> Option<NodeId> {
    node.filter(|node| !node.kind.is_container()).map(|node| node.id.clone())
}

/// Applies the write-mode rules to `path`. Tree backends cannot append.
pub(crate) fn write(
    snapshot: &Snapshot,
    path: &str,
    mode: FileMode,
) -> Result<Placement, StorageError> {
    let mode = mode.ensure_writable()?;
    if mode == FileMode::Append {
        return Err(StorageError::unsupported("append is not supported by tree backends"));
    }
    let existing = snapshot.resolve(path);
    let replaces = match existing {
        // Create clears whatever holds the name, directories included.
        Some(node)
            if mode == FileMode::Create
                && node.kind.is_container()
                && node.id != snapshot.root().id =>
        {
            Some(node.id.clone())
        },
        _ => {
            rules::check_write(path, mode, entry_kind(existing))?;
            existing_file(existing)
        },
    };
    let (parent, name) = placement(snapshot, path)?;
    Ok(Placement { parent, name, replaces })
}

pub(crate) fn relocate(
    snapshot: &Snapshot,
    path: &str,
    new_path: &str,
    overwrite: bool,
) -> Result<Relocation, StorageError> {
    let source = snapshot.resolve(path);
    rules::require_file(path, entry_kind(source))?;
    let source = source.cloned().ok_or_else(|| StorageError::file_not_found(path.to_owned()))?;

    let destination = snapshot.resolve(new_path);
    rules::check_destination(new_path, entry_kind(destination), overwrite)?;
    let (parent, name) = placement(snapshot, new_path)?;
    let replaces = existing_file(destination).filter(|id| *id != source.id);
    Ok(Relocation { source, target: Placement { parent, name, replaces } })
}

/// `Ok(None)` when the directory is already there.
pub(crate) fn create_directory(
    snapshot: &Snapshot,
    path: &str,
) -> Result<Option<(NodeId, String)>, StorageError> {
    if !rules::check_create_directory(path, entry_kind(snapshot.resolve(path)))? {
        return Ok(None);
    }
    placement(snapshot, path).map(Some)
}

/// `Ok(None)` when a non-recursive delete has to refuse a non-empty directory.
pub(crate) fn delete_directory(
    snapshot: &Snapshot,
    path: &str,
    recursive: bool,
) -> Result<Option<NodeId>, StorageError> {
    let node = snapshot.resolve(path);
    rules::require_directory(path, entry_kind(node))?;
    let node = node.ok_or_else(|| StorageError::directory_not_found(path.to_owned()))?;
    if node.id == snapshot.root().id {
        return Err(StorageError::invalid_argument("the provider root cannot be deleted"));
    }
    if !recursive && snapshot.has_children(&node.id) {
        return Ok(None);
    }
    Ok(Some(node.id.clone()))
}

pub(crate) fn delete_file(snapshot: &Snapshot, path: &str) -> Result<NodeId, StorageError> {
    let node = snapshot.resolve(path);
    rules::require_file(path, entry_kind(node))?;
    node.map(|node| node.id.clone()).ok_or_else(|| StorageError::file_not_found(path.to_owned()))
}

pub(crate) fn read(snapshot: &Snapshot, path: &str) -> Result<NodeId, StorageError> {
    delete_file(snapshot, path)
}

pub(crate) fn listing(snapshot: &Snapshot, path: &str) -> Result<NodeId, StorageError> {
    let node = snapshot.resolve(path);
    rules::require_directory(path, entry_kind(node))?;
    node.map(|node| node.id.clone())
        .ok_or_else(|| StorageError::directory_not_found(path.to_owned()))
}
