use std::borrow::Cow;
use std::io;

/// A specialized [`StorageError`] enum of this crate.
#[depot_derive::depot_error]
pub enum StorageError {
    #[error("File not found{}: {message}", format_context(.context))]
    FileNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Directory not found{}: {message}", format_context(.context))]
    DirectoryNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Entry already exists{}: {message}", format_context(.context))]
    AlreadyExists { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Node type mismatch{}: {message}", format_context(.context))]
    TypeMismatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Unsupported operation{}: {message}", format_context(.context))]
    Unsupported { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid argument{}: {message}", format_context(.context))]
    InvalidArgument { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Path traversal security violation{}: {message}", format_context(.context))]
    PathTraversalAttempt { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Backend failure{}: {message}", format_context(.context))]
    Backend { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Operation cancelled{}", format_context(.context))]
    Cancelled { context: Option<Cow<'static, str>> },

    #[error("Hardware I/O failure{}: {source}", format_context(.context))]
    Io { source: io::Error, context: Option<Cow<'static, str>> },

    #[error("Configuration failure{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },

    #[error("Internal fault{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl StorageError {
    /// `true` for both [`StorageError::FileNotFound`] and [`StorageError::DirectoryNotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. } | Self::DirectoryNotFound { .. })
    }

    pub(crate) fn file_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { message: path.into(), context: None }
    }

    pub(crate) fn directory_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::DirectoryNotFound { message: path.into(), context: None }
    }

    pub(crate) fn already_exists(path: impl Into<Cow<'static, str>>) -> Self {
        Self::AlreadyExists { message: path.into(), context: None }
    }

    pub(crate) fn type_mismatch(message: impl Into<Cow<'static, str>>) -> Self {
        Self::TypeMismatch { message: message.into(), context: None }
    }

    pub(crate) fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Unsupported { message: message.into(), context: None }
    }

    pub(crate) fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument { message: message.into(), context: None }
    }

    pub(crate) fn backend(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Backend { message: message.into(), context: None }
    }

    pub(crate) const fn cancelled() -> Self {
        Self::Cancelled { context: None }
    }
}

/// Stream code speaks `std::io`; this keeps the original variant reachable through
/// [`io::Error::get_ref`] for callers that want it back.
impl From<StorageError> for io::Error {
    fn from(err: StorageError) -> Self {
        let kind = match &err {
            StorageError::Io { source, .. } => source.kind(),
            StorageError::FileNotFound { .. } | StorageError::DirectoryNotFound { .. } => {
                io::ErrorKind::NotFound
            },
            StorageError::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            StorageError::Unsupported { .. } => io::ErrorKind::Unsupported,
            StorageError::InvalidArgument { .. } | StorageError::TypeMismatch { .. } => {
                io::ErrorKind::InvalidInput
            },
            StorageError::PathTraversalAttempt { .. } => io::ErrorKind::PermissionDenied,
            StorageError::Cancelled { .. } => io::ErrorKind::Interrupted,
            StorageError::Backend { .. }
            | StorageError::Config { .. }
            | StorageError::Internal { .. } => io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_conversion_keeps_kind_and_source() {
        let err: io::Error = StorageError::unsupported("seek").into();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<StorageError>());
        assert!(matches!(inner, Some(StorageError::Unsupported { .. })));
    }

    #[test]
    fn context_is_rendered_in_message() {
        let err = Err::<(), _>(StorageError::file_not_found("a/b.bin"))
            .context("reading")
            .unwrap_err();
        assert_eq!(err.to_string(), "File not found (reading): a/b.bin");
        assert!(err.is_not_found());
    }
}
