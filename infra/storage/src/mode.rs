use crate::error::StorageError;
use serde::Deserialize;
use std::fs::OpenOptions;

/// How a write addresses an existing (or missing) entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMode {
    /// Fail if the entry already exists.
    #[default]
    CreateNew,
    /// Replace whatever exists.
    Create,
    /// Overwrite an entry that must already exist.
    Truncate,
    /// Add to the end of the entry, creating it if needed.
    Append,
    /// Open an existing entry. Not valid for write-only entry points.
    Open,
    /// Open or create. Not valid for write-only entry points.
    OpenOrCreate,
}

impl FileMode {
    /// Rejects the modes that make no sense for a write-only entry point.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidArgument`] for [`FileMode::Open`] and
    /// [`FileMode::OpenOrCreate`].
    pub fn ensure_writable(self) -> Result<Self, StorageError> {
        match self {
            Self::Open | Self::OpenOrCreate => Err(StorageError::invalid_argument(format!(
                "{self:?} is not valid for writing"
            ))),
            mode => Ok(mode),
        }
    }

    /// Translates the mode into `std` open options with write access.
    #[must_use]
    pub fn open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            Self::CreateNew => options.write(true).create_new(true),
            Self::Create => options.write(true).create(true).truncate(true),
            Self::Truncate => options.write(true).truncate(true),
            Self::Append => options.append(true).create(true),
            Self::Open => options.write(true),
            Self::OpenOrCreate => options.write(true).create(true),
        };
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_modes_are_rejected_for_writes() {
        assert!(matches!(
            FileMode::Open.ensure_writable(),
            Err(StorageError::InvalidArgument { .. })
        ));
        assert!(FileMode::OpenOrCreate.ensure_writable().is_err());
        assert_eq!(FileMode::Append.ensure_writable().ok(), Some(FileMode::Append));
    }
}
