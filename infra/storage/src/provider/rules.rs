//! Precondition checks shared by every provider, expressed over what a lookup found.

use crate::error::StorageError;
use crate::mode::FileMode;

/// What occupies a path, as far as the storage rules care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// The entry must be an existing directory (or the root).
pub(crate) fn require_directory(path: &str, found: Option<EntryKind>) -> Result<(), StorageError> {
    match found {
        Some(EntryKind::Directory) => Ok(()),
        Some(EntryKind::File) => {
            Err(StorageError::type_mismatch(format!("'{path}' is a file, not a directory")))
        },
        None => Err(StorageError::directory_not_found(path.to_owned())),
    }
}

/// The entry must be an existing file.
pub(crate) fn require_file(path: &str, found: Option<EntryKind>) -> Result<(), StorageError> {
    match found {
        Some(EntryKind::File) => Ok(()),
        Some(EntryKind::Directory) => {
            Err(StorageError::type_mismatch(format!("'{path}' is a directory, not a file")))
        },
        None => Err(StorageError::file_not_found(path.to_owned())),
    }
}

/// Validates a write of `mode` over whatever `target` holds.
pub(crate) fn check_write(
    path: &str,
    mode: FileMode,
    target: Option<EntryKind>,
) -> Result<FileMode, StorageError> {
    let mode = mode.ensure_writable()?;
    match (mode, target) {
        (_, Some(EntryKind::Directory)) => {
            Err(StorageError::type_mismatch(format!("'{path}' is a directory")))
        },
        (FileMode::CreateNew, Some(EntryKind::File)) => {
            Err(StorageError::already_exists(path.to_owned()))
        },
        (FileMode::Truncate, None) => Err(StorageError::file_not_found(path.to_owned())),
        _ => Ok(mode),
    }
}

/// `Ok(true)` when a directory still has to be created at `path`.
pub(crate) fn check_create_directory(
    path: &str,
    target: Option<EntryKind>,
) -> Result<bool, StorageError> {
    match target {
        None => Ok(true),
        Some(EntryKind::Directory) => Ok(false),
        Some(EntryKind::File) => Err(StorageError::type_mismatch(format!(
            "'{path}' already exists and is not a directory"
        ))),
    }
}

/// Validates a move/copy destination. `Ok(true)` when an existing file must be replaced.
pub(crate) fn check_destination(
    path: &str,
    target: Option<EntryKind>,
    overwrite: bool,
) -> Result<bool, StorageError> {
    match target {
        None => Ok(false),
        Some(EntryKind::Directory) => {
            Err(StorageError::type_mismatch(format!("destination '{path}' is a directory")))
        },
        Some(EntryKind::File) if overwrite => Ok(true),
        Some(EntryKind::File) => Err(StorageError::already_exists(path.to_owned())),
    }
}
