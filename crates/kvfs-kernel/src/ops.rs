//! Filesystem operations trait.
//!
//! Path-based, like an OS driver sees them. Paths are cleaned lexically
//! before use (see [`FsPath`](crate::path::FsPath)), so relative paths are
//! taken from the root.

use async_trait::async_trait;
use std::time::SystemTime;

use crate::error::FsResult;
use crate::file::File;
use crate::types::{Metadata, OpenFlags};

/// Core filesystem operations.
///
/// Every mutating call is one atomic transaction: it either applies in full
/// or leaves the namespace untouched.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Name of this filesystem instance, for logs and `Debug`.
    fn name(&self) -> &str;

    // ========================================================================
    // Namespace
    // ========================================================================

    /// Create an empty regular file (mode 0o666) or truncate an existing one.
    async fn create(&self, path: &str) -> FsResult<File>;

    /// Create a directory. The parent must exist.
    async fn mkdir(&self, path: &str, perm: u32) -> FsResult<()>;

    /// Create a directory and every missing parent.
    ///
    /// Existing directories along the way are fine; an existing file is
    /// `NotADirectory`.
    async fn mkdir_all(&self, path: &str, perm: u32) -> FsResult<()>;

    /// Remove a file or an empty directory.
    async fn remove(&self, path: &str) -> FsResult<()>;

    /// Remove a path and everything beneath it. A missing path is success.
    async fn remove_all(&self, path: &str) -> FsResult<()>;

    /// Move `from` to `to`. The target name must be free.
    async fn rename(&self, from: &str, to: &str) -> FsResult<()>;

    // ========================================================================
    // Access
    // ========================================================================

    /// Open for reading.
    async fn open(&self, path: &str) -> FsResult<File>;

    /// Open with explicit flags; `perm` applies when a file is created.
    async fn open_file(&self, path: &str, flags: OpenFlags, perm: u32) -> FsResult<File>;

    // ========================================================================
    // Metadata
    // ========================================================================

    async fn stat(&self, path: &str) -> FsResult<Metadata>;

    /// Replace the permission bits.
    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Set modification time. Access time is accepted but not stored.
    async fn chtimes(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> FsResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// List a directory with child metadata.
    async fn read_dir(&self, path: &str) -> FsResult<Vec<Metadata>> {
        self.open(path).await?.read_dir().await
    }
}
