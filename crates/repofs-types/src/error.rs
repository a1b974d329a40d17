//! Error types for filesystem and content-provider operations.

use std::path::Path;

use thiserror::Error;

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Failure reported by a content provider.
///
/// Providers must keep "the file does not exist remotely" distinguishable
/// from every other failure so decorators can apply a 404 policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("content not found: {0}")]
    NotFound(String),
    #[error("content fetch failed: {0}")]
    Fetch(String),
}

/// Filesystem operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("invalid argument: {0}")]
    Invalid(String),
    #[error(transparent)]
    Provider(#[from] ContentError),
    #[error("io error: {0}")]
    Io(String),
}

impl FsError {
    pub fn not_found(path: impl AsRef<Path>) -> Self {
        FsError::NotFound(path.as_ref().display().to_string())
    }

    pub fn already_exists(path: impl AsRef<Path>) -> Self {
        FsError::AlreadyExists(path.as_ref().display().to_string())
    }

    pub fn not_a_directory(path: impl AsRef<Path>) -> Self {
        FsError::NotADirectory(path.as_ref().display().to_string())
    }

    pub fn is_a_directory(path: impl AsRef<Path>) -> Self {
        FsError::IsADirectory(path.as_ref().display().to_string())
    }

    pub fn directory_not_empty(path: impl AsRef<Path>) -> Self {
        FsError::DirectoryNotEmpty(path.as_ref().display().to_string())
    }

    pub fn permission_denied(path: impl AsRef<Path>) -> Self {
        FsError::PermissionDenied(path.as_ref().display().to_string())
    }

    pub fn not_supported(operation: impl Into<String>) -> Self {
        FsError::NotSupported(operation.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        FsError::Invalid(message.into())
    }

    /// True for a local NotFound and for a provider-side NotFound.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FsError::NotFound(_) | FsError::Provider(ContentError::NotFound(_))
        )
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => FsError::NotFound(err.to_string()),
            ErrorKind::AlreadyExists => FsError::AlreadyExists(err.to_string()),
            ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem => {
                FsError::PermissionDenied(err.to_string())
            }
            ErrorKind::IsADirectory => FsError::IsADirectory(err.to_string()),
            ErrorKind::NotADirectory => FsError::NotADirectory(err.to_string()),
            ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty(err.to_string()),
            ErrorKind::Unsupported => FsError::NotSupported(err.to_string()),
            ErrorKind::InvalidInput => FsError::Invalid(err.to_string()),
            _ => FsError::Io(err.to_string()),
        }
    }
}
