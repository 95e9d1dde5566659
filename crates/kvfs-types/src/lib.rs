//! Persisted data model for kvfs.
//!
//! kvfs keeps filesystem metadata as versioned records in a transactional
//! key-value store. This crate is the leaf everything else builds on: inode
//! identity, fencing tokens, the inode payload and its codec, and the sorted
//! directory-entry index. It does no I/O.
//!
//! # Key Types
//!
//! |-------------------|-----------------------------------------------------|
//! | Type              | Purpose                                             |
//! |-------------------|-----------------------------------------------------|
//! | [`InodeId`]       | Inode identity; its hex text is the backend key     |
//! | [`Version`]       | Fencing token observed on read                      |
//! | [`InodeMeta`]     | Persisted payload (postcard)                        |
//! | [`Inode`]         | Id + version + payload, as one attempt sees it      |
//! | [`DirEntries`]    | Sorted `(name, child)` list with binary search      |
//! |-------------------|-----------------------------------------------------|

pub mod dirent;
pub mod error;
pub mod ids;
pub mod inode;

pub use dirent::{DirEnt, DirEntries};
pub use error::{CodecError, EntryError, KeyError};
pub use ids::{InodeId, Version};
pub use inode::{Inode, InodeMeta, PERMISSION_MASK, unix_now, unix_seconds};
