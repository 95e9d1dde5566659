//! Path cleaning and resolution.
//!
//! Paths are cleaned lexically before they reach the backend: empty
//! segments and `.` are dropped, `..` pops the previous segment (and stops at
//! the root). The result is always absolute, so `"a/b"`, `"/a/b/"` and
//! `"/a/./c/../b"` all name the same [`FsPath`].
//!
//! Resolution walks segments from the root inode, one backend read per
//! segment, through whatever [`InodeReader`] the caller supplies. Inside a
//! transaction that reader is the [`Txn`](crate::txn::Txn), which fences every
//! inode it reads; outside one it is a [`Snapshot`].

use async_trait::async_trait;
use std::fmt;

use kvfs_types::{Inode, InodeId};

use crate::backend::KvBackend;
use crate::error::{FsError, FsResult};

/// A cleaned absolute path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FsPath {
    segments: Vec<String>,
}

impl FsPath {
    /// The root directory.
    pub fn root() -> Self {
        Self::default()
    }

    /// Clean `path` into segments.
    pub fn parse(path: &str) -> Self {
        let mut segments: Vec<String> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                name => segments.push(name.to_string()),
            }
        }
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final segment, or `"/"` for the root.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("/")
    }

    /// Split into parent directory and leaf name. `None` for the root.
    pub fn split_leaf(&self) -> Option<(FsPath, &str)> {
        let (leaf, parent) = self.segments.split_last()?;
        Some((
            FsPath {
                segments: parent.to_vec(),
            },
            leaf.as_str(),
        ))
    }

    /// Child path `self/name`.
    pub fn join(&self, name: &str) -> FsPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        FsPath { segments }
    }

    /// Every non-root prefix, shortest first: `/a`, `/a/b`, `/a/b/c`.
    pub fn prefixes(&self) -> impl Iterator<Item = FsPath> + '_ {
        (1..=self.segments.len()).map(|n| FsPath {
            segments: self.segments[..n].to_vec(),
        })
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Anything that can load an inode by id.
#[async_trait]
pub trait InodeReader: Send + Sync {
    async fn read_inode(&self, id: InodeId) -> FsResult<Inode>;
}

/// Read an inode straight from the backend.
///
/// A missing key is a dangling reference (or an unformatted namespace when
/// it is the root) and reported as `NotFound`.
pub async fn load_inode(backend: &dyn KvBackend, id: InodeId) -> FsResult<Inode> {
    let key = id.to_key();
    match backend.get(&key).await? {
        Some(found) => Inode::decode(id, found.version, &found.value)
            .map_err(|source| FsError::decode(key, source)),
        None if id.is_root() => Err(FsError::not_found("/ (namespace not formatted)")),
        None => Err(FsError::not_found(format!("inode {id}"))),
    }
}

/// Non-transactional reader: each inode is read on its own.
#[derive(Clone, Copy)]
pub struct Snapshot<'a> {
    backend: &'a dyn KvBackend,
}

impl<'a> Snapshot<'a> {
    pub fn new(backend: &'a dyn KvBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<'a> InodeReader for Snapshot<'a> {
    async fn read_inode(&self, id: InodeId) -> FsResult<Inode> {
        load_inode(self.backend, id).await
    }
}

/// Outcome of a path walk.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The inode the path names.
    pub inode: Inode,
    /// Every inode read on the way, root first, target last.
    pub visited: Vec<InodeId>,
}

/// Walk `path` from the root.
///
/// Fails `NotADirectory` when a non-final segment names a file and
/// `NotFound` when a segment is missing. The empty path yields the root.
pub async fn resolve<R>(reader: &R, path: &FsPath) -> FsResult<Resolution>
where
    R: InodeReader + ?Sized,
{
    let mut inode = reader.read_inode(InodeId::ROOT).await?;
    let mut visited = vec![inode.id];
    let mut walked = FsPath::root();

    for segment in path.segments() {
        if !inode.is_dir() {
            return Err(FsError::not_a_directory(walked.to_string()));
        }
        walked = walked.join(segment);
        let child = inode
            .meta
            .entries
            .find(segment)
            .map_err(|_| FsError::not_found(walked.to_string()))?;
        inode = reader.read_inode(child).await?;
        visited.push(inode.id);
    }

    Ok(Resolution { inode, visited })
}

/// Walk `path` and require the result to be a directory.
pub async fn resolve_dir<R>(reader: &R, path: &FsPath) -> FsResult<Resolution>
where
    R: InodeReader + ?Sized,
{
    let resolution = resolve(reader, path).await?;
    if !resolution.inode.is_dir() {
        return Err(FsError::not_a_directory(path.to_string()));
    }
    Ok(resolution)
}
