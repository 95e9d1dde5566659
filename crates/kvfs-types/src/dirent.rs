//! Directory entries and the sorted-name index over them.
//!
//! A directory inode carries its children inline as a [`DirEntries`] list,
//! kept strictly sorted by name (byte-wise `str` order). All lookups go
//! through `binary_search_by`, so `find`, `insert` and `remove` locate their
//! slot in `O(log n)` comparisons; `insert` and `remove` then shift the tail.
//!
//! These are pure operations over an in-memory copy. Nothing here talks to
//! the backend: callers read an inode, mutate its entries, and stage the
//! result in a transaction.

use serde::{Deserialize, Serialize};

use crate::error::EntryError;
use crate::ids::InodeId;

/// One `(name, child)` link inside a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEnt {
    /// Entry name (a single path segment, never empty).
    pub name: String,
    /// The inode this name points at.
    pub child: InodeId,
}

impl DirEnt {
    pub fn new(name: impl Into<String>, child: InodeId) -> Self {
        Self {
            name: name.into(),
            child,
        }
    }
}

/// Sorted, duplicate-free list of directory entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirEntries(Vec<DirEnt>);

impl DirEntries {
    /// An empty directory.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    fn search(&self, name: &str) -> Result<usize, usize> {
        self.0.binary_search_by(|ent| ent.name.as_str().cmp(name))
    }

    /// Look up the child id stored under `name`.
    pub fn find(&self, name: &str) -> Result<InodeId, EntryError> {
        self.search(name)
            .map(|i| self.0[i].child)
            .map_err(|_| EntryError::NotFound(name.to_string()))
    }

    /// Link `name` to `child`, keeping the list sorted.
    pub fn insert(&mut self, name: &str, child: InodeId) -> Result<(), EntryError> {
        match self.search(name) {
            Ok(_) => Err(EntryError::AlreadyExists(name.to_string())),
            Err(slot) => {
                self.0.insert(slot, DirEnt::new(name, child));
                Ok(())
            }
        }
    }

    /// Unlink `name`, returning the id it pointed at.
    pub fn remove(&mut self, name: &str) -> Result<InodeId, EntryError> {
        match self.search(name) {
            Ok(i) => Ok(self.0.remove(i).child),
            Err(_) => Err(EntryError::NotFound(name.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DirEnt> {
        self.0.iter()
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|ent| ent.name.clone()).collect()
    }

    /// First name that breaks strict ordering, if any.
    ///
    /// A decoded payload is only trusted when this returns `None`.
    pub fn first_unsorted(&self) -> Option<&str> {
        self.0
            .windows(2)
            .find(|pair| pair[0].name >= pair[1].name)
            .map(|pair| pair[1].name.as_str())
    }
}

impl<'a> IntoIterator for &'a DirEntries {
    type Item = &'a DirEnt;
    type IntoIter = std::slice::Iter<'a, DirEnt>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
