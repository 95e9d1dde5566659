//! Inode records and their persisted encoding.
//!
//! The persisted payload is [`InodeMeta`], encoded with postcard. Identity
//! (the key) and the fencing token travel out of band, so an [`Inode`] pairs
//! the payload with both without embedding one in the other.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::dirent::DirEntries;
use crate::error::CodecError;
use crate::ids::{InodeId, Version};

/// Permission bits kept on an inode (`rwx` triplets plus setuid/setgid/sticky).
pub const PERMISSION_MASK: u32 = 0o7777;

/// Persisted metadata of one filesystem object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeMeta {
    /// Mode/permission bits.
    pub permissions: u32,
    /// Directory or regular file.
    pub is_dir: bool,
    /// Byte length (regular files only).
    pub size: u64,
    /// Last modification, Unix seconds.
    pub modified_at: i64,
    /// Children, directories only.
    pub entries: DirEntries,
}

impl InodeMeta {
    /// Metadata for a new empty directory.
    pub fn directory(permissions: u32, modified_at: i64) -> Self {
        Self {
            permissions: permissions & PERMISSION_MASK,
            is_dir: true,
            size: 0,
            modified_at,
            entries: DirEntries::new(),
        }
    }

    /// Metadata for a new empty regular file.
    pub fn file(permissions: u32, modified_at: i64) -> Self {
        Self {
            permissions: permissions & PERMISSION_MASK,
            is_dir: false,
            size: 0,
            modified_at,
            entries: DirEntries::new(),
        }
    }

    /// Encode to the backend value format.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decode a backend value, rejecting entry lists that are out of order.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let meta: InodeMeta = postcard::from_bytes(bytes)?;
        if let Some(name) = meta.entries.first_unsorted() {
            return Err(CodecError::UnsortedEntries(name.to_string()));
        }
        Ok(meta)
    }
}

/// An inode as seen by one transaction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub id: InodeId,
    /// Version observed when this copy was read; [`Version::ABSENT`] for an
    /// inode that has not been written yet.
    pub version: Version,
    pub meta: InodeMeta,
}

impl Inode {
    /// A freshly allocated inode that does not exist in the backend yet.
    pub fn fresh(id: InodeId, meta: InodeMeta) -> Self {
        Self {
            id,
            version: Version::ABSENT,
            meta,
        }
    }

    /// Backend key of this inode.
    pub fn key(&self) -> String {
        self.id.to_key()
    }

    pub fn is_dir(&self) -> bool {
        self.meta.is_dir
    }

    /// Decode a value read under `version`.
    pub fn decode(id: InodeId, version: Version, bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(Self {
            id,
            version,
            meta: InodeMeta::decode(bytes)?,
        })
    }
}

/// Current wall-clock time as Unix seconds.
pub fn unix_now() -> i64 {
    unix_seconds(SystemTime::now())
}

/// Convert a `SystemTime` to Unix seconds (negative before the epoch).
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_directory_payload_survives_encoding() {
        let mut meta = InodeMeta::directory(0o755, 1_700_000_000);
        meta.entries.insert("b", InodeId::from_raw(2)).unwrap();
        meta.entries.insert("a", InodeId::from_raw(1)).unwrap();

        let bytes = meta.encode().unwrap();
        let back = InodeMeta::decode(&bytes).unwrap();
        assert_eq!(back, meta);
        assert_eq!(back.entries.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_file_payload_keeps_size_and_negative_mtime() {
        let mut meta = InodeMeta::file(0o644, -5);
        meta.size = u64::MAX;
        let back = InodeMeta::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(back.size, u64::MAX);
        assert_eq!(back.modified_at, -5);
        assert!(!back.is_dir);
    }

    #[test]
    fn test_permissions_are_masked() {
        let meta = InodeMeta::directory(0o40755, 0);
        assert_eq!(meta.permissions, 0o755);
    }

    #[test]
    fn test_decode_garbage() {
        let err = InodeMeta::decode(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, CodecError::Postcard(_)));
    }

    #[test]
    fn test_decode_rejects_unsorted_entries() {
        #[derive(Serialize)]
        struct Raw {
            permissions: u32,
            is_dir: bool,
            size: u64,
            modified_at: i64,
            entries: Vec<crate::DirEnt>,
        }
        let raw = Raw {
            permissions: 0o755,
            is_dir: true,
            size: 0,
            modified_at: 0,
            entries: vec![
                crate::DirEnt::new("z", InodeId::from_raw(1)),
                crate::DirEnt::new("a", InodeId::from_raw(2)),
            ],
        };
        let bytes = postcard::to_allocvec(&raw).unwrap();
        let err = InodeMeta::decode(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::UnsortedEntries(name) if name == "a"));
    }

    #[test]
    fn test_fresh_inode_is_absent() {
        let inode = Inode::fresh(InodeId::from_raw(0xabc), InodeMeta::file(0o600, 0));
        assert!(inode.version.is_absent());
        assert_eq!(inode.key(), "abc");
    }

    #[test]
    fn test_unix_seconds() {
        assert_eq!(unix_seconds(UNIX_EPOCH + Duration::from_secs(42)), 42);
        assert_eq!(unix_seconds(UNIX_EPOCH - Duration::from_secs(42)), -42);
    }
}
