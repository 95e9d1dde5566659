//! Error types for the data model.

use thiserror::Error;

/// A directory-entry mutation that cannot apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    /// No entry with this name.
    #[error("no entry named {0:?}")]
    NotFound(String),

    /// An entry with this name already exists.
    #[error("entry {0:?} already exists")]
    AlreadyExists(String),
}

/// A persisted inode payload could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The binary encoding is malformed.
    #[error("inode payload: {0}")]
    Postcard(#[from] postcard::Error),

    /// Entries decoded fine but are not strictly sorted by name.
    #[error("inode payload: entries not strictly sorted at {0:?}")]
    UnsortedEntries(String),
}

/// A backend key that is not the canonical hex form of an inode id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid inode key: {0:?}")]
pub struct KeyError(pub String);
