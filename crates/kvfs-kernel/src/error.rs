//! Filesystem error types.

use std::io;

use kvfs_types::CodecError;
use thiserror::Error;

use crate::backend::BackendError;

/// Error returned by every filesystem operation.
#[derive(Debug, Error)]
pub enum FsError {
    /// A path segment or leaf does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The leaf name is already taken.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a regular file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory still has entries.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The path cannot be used for this operation (root, or a rename into
    /// its own subtree).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Every attempt lost its commit race.
    #[error("{op}: gave up after {attempts} conflicting attempts")]
    Busy { op: &'static str, attempts: u32 },

    /// Backend unreachable or failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Stored payload is malformed.
    #[error("corrupt inode {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: CodecError,
    },
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn decode(key: impl Into<String>, source: CodecError) -> Self {
        Self::Decode {
            key: key.into(),
            source,
        }
    }

    /// POSIX errno for driver adapters.
    pub fn errno(&self) -> libc::c_int {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
            FsError::InvalidPath(_) => libc::EINVAL,
            FsError::Busy { .. } => libc::EBUSY,
            FsError::Backend(_) | FsError::Decode { .. } => libc::EIO,
        }
    }
}

/// Convert FsError to std::io::Error for compatibility.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            FsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            FsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            FsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            FsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            e @ FsError::Busy { .. } => io::Error::new(io::ErrorKind::ResourceBusy, e.to_string()),
            e @ FsError::Decode { .. } => io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
            FsError::Backend(e) => io::Error::other(e),
        }
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;
