//! Types returned across the filesystem boundary.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kvfs_types::{Inode, InodeId};

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Result of `stat`: the inode's metadata with its name attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Final path segment, `"/"` for the root.
    pub name: String,
    pub id: InodeId,
    pub kind: FileType,
    /// Permission bits (e.g. 0o755).
    pub permissions: u32,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

impl Metadata {
    pub fn from_inode(name: impl Into<String>, inode: &Inode) -> Self {
        let kind = if inode.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };
        Self {
            name: name.into(),
            id: inode.id,
            kind,
            permissions: inode.meta.permissions,
            size: inode.meta.size,
            modified: system_time(inode.meta.modified_at),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Permission bits, as in `FileMode::perm`.
    pub fn mode(&self) -> u32 {
        self.permissions
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

fn system_time(unix_seconds: i64) -> SystemTime {
    if unix_seconds >= 0 {
        UNIX_EPOCH + Duration::from_secs(unix_seconds as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(unix_seconds.unsigned_abs())
    }
}

/// Open file flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Write access (also enables read).
    pub fn write() -> Self {
        Self {
            write: true,
            ..Default::default()
        }
    }

    /// Create with write access.
    pub fn create() -> Self {
        Self {
            write: true,
            create: true,
            ..Default::default()
        }
    }

    /// Create exclusively (fail if exists).
    pub fn create_exclusive() -> Self {
        Self {
            exclusive: true,
            ..Self::create()
        }
    }

    /// Create and truncate.
    pub fn create_truncate() -> Self {
        Self {
            truncate: true,
            ..Self::create()
        }
    }

    /// True when opening may change the namespace or an inode.
    pub fn mutates(&self) -> bool {
        self.create || (self.truncate && self.write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvfs_types::InodeMeta;

    #[test]
    fn test_metadata_from_directory() {
        let inode = Inode::fresh(InodeId::from_raw(0xa), InodeMeta::directory(0o755, 1_000));
        let meta = Metadata::from_inode("a", &inode);
        assert!(meta.is_dir());
        assert_eq!(meta.mode(), 0o755);
        assert_eq!(meta.modified, UNIX_EPOCH + Duration::from_secs(1_000));
        assert_eq!(meta.id, InodeId::from_raw(0xa));
    }

    #[test]
    fn test_metadata_before_epoch() {
        let inode = Inode::fresh(InodeId::from_raw(1), InodeMeta::file(0o644, -10));
        let meta = Metadata::from_inode("f", &inode);
        assert!(meta.is_file());
        assert_eq!(meta.modified, UNIX_EPOCH - Duration::from_secs(10));
    }

    #[test]
    fn test_open_flags() {
        let read = OpenFlags::read();
        assert!(read.read);
        assert!(!read.write);
        assert!(!read.mutates());

        let create = OpenFlags::create_exclusive();
        assert!(create.create);
        assert!(create.exclusive);
        assert!(create.write);
        assert!(create.mutates());

        // Truncate without write access is ignored.
        let odd = OpenFlags {
            truncate: true,
            ..OpenFlags::read()
        };
        assert!(!odd.mutates());
    }
}
