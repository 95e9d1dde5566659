//! Inode identifiers and fencing tokens.
//!
//! An [`InodeId`] is a random 64-bit number assigned by whichever process
//! creates the inode. It is the only handle the backend knows: every inode
//! lives under exactly one key, the lowercase hex text of its id
//! ([`InodeId::to_key`]). Id `0` is reserved for the root directory.
//!
//! A [`Version`] is the opaque token the backend hands out alongside a value.
//! It is never persisted inside the payload; it only travels with a read so
//! the commit can assert the key has not moved on since.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Identifier of an inode (random, except for the root).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InodeId(u64);

impl InodeId {
    /// The root directory. Always present once a namespace is formatted.
    pub const ROOT: InodeId = InodeId(0);

    /// Wrap a raw id.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Draw a fresh random id. Never returns [`InodeId::ROOT`].
    pub fn random() -> Self {
        loop {
            let raw: u64 = rand::random();
            if raw != 0 {
                return Self(raw);
            }
        }
    }

    /// The raw integer.
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == 0
    }

    /// Backend key for this inode: lowercase hex, no prefix, no padding.
    pub fn to_key(&self) -> String {
        format!("{:x}", self.0)
    }

    /// Parse a backend key produced by [`InodeId::to_key`].
    pub fn from_key(key: &str) -> Result<Self, KeyError> {
        let canonical = !key.is_empty()
            && key.len() <= 16
            && key.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
            && (key == "0" || !key.starts_with('0'));
        if !canonical {
            return Err(KeyError(key.to_string()));
        }
        u64::from_str_radix(key, 16)
            .map(Self)
            .map_err(|_| KeyError(key.to_string()))
    }
}

impl From<u64> for InodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<InodeId> for u64 {
    fn from(id: InodeId) -> u64 {
        id.0
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::Debug for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InodeId({:x})", self.0)
    }
}

/// Opaque fencing token returned by the backend on read.
///
/// Only meaningful within the attempt that observed it. Ordering between two
/// versions of the same key follows the backend's revision counter.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// The key does not exist.
    pub const ABSENT: Version = Version(0);

    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(&self) -> i64 {
        self.0
    }

    pub fn is_absent(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.0)
    }
}
