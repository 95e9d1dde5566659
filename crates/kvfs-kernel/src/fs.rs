//! [`FileSystem`] over a [`KvBackend`].
//!
//! Every mutating operation is a single [`TxnEngine::run`]: resolve through
//! the transaction (fencing every inode on the way), edit private copies of
//! the touched inodes, stage them, commit. Reads that need no atomicity
//! (`stat`, `open`) go through a [`Snapshot`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;

use kvfs_types::{Inode, InodeId, InodeMeta, PERMISSION_MASK, unix_now, unix_seconds};

use crate::backend::KvBackend;
use crate::error::{FsError, FsResult};
use crate::file::File;
use crate::ops::FileSystem;
use crate::path::{FsPath, Snapshot, resolve, resolve_dir};
use crate::txn::{RetryPolicy, TxnEngine};
use crate::types::{Metadata, OpenFlags};

/// Permission bits of files made by `create`.
const CREATE_PERM: u32 = 0o666;

/// Filesystem whose metadata lives in a versioned key-value store.
pub struct KvFs {
    name: String,
    engine: TxnEngine,
}

impl std::fmt::Debug for KvFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvFs")
            .field("name", &self.name)
            .field("engine", &self.engine)
            .finish()
    }
}

impl KvFs {
    /// Filesystem with the default retry policy.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self::with_policy(backend, RetryPolicy::default())
    }

    pub fn with_policy(backend: Arc<dyn KvBackend>, policy: RetryPolicy) -> Self {
        Self {
            name: format!("kvfs:{}", backend.name()),
            engine: TxnEngine::new(backend, policy),
        }
    }

    pub fn engine(&self) -> &TxnEngine {
        &self.engine
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        self.engine.backend()
    }

    fn snapshot(&self) -> Snapshot<'_> {
        Snapshot::new(self.engine.backend().as_ref())
    }

    async fn make_dir(&self, path: &FsPath, perm: u32) -> FsResult<()> {
        let Some((parent_path, leaf)) = path.split_leaf() else {
            return Err(FsError::already_exists("/"));
        };
        let parent_path = &parent_path;

        self.engine
            .run("mkdir", |txn| async move {
                let mut parent = resolve_dir(&txn, parent_path).await?.inode;
                let now = unix_now();
                let child = Inode::fresh(InodeId::random(), InodeMeta::directory(perm, now));

                parent
                    .meta
                    .entries
                    .insert(leaf, child.id)
                    .map_err(|_| FsError::already_exists(path.to_string()))?;
                parent.meta.modified_at = now;

                txn.create(&child)?;
                txn.put(&parent)
            })
            .await
    }

    async fn open_path(&self, path: FsPath) -> FsResult<File> {
        let inode = resolve(&self.snapshot(), &path).await?.inode;
        Ok(File::new(self.backend().clone(), path, inode))
    }
}

#[async_trait]
impl FileSystem for KvFs {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self), name = "fs.create")]
    async fn create(&self, path: &str) -> FsResult<File> {
        self.open_file(path, OpenFlags::create_truncate(), CREATE_PERM)
            .await
    }

    #[tracing::instrument(skip(self), name = "fs.mkdir")]
    async fn mkdir(&self, path: &str, perm: u32) -> FsResult<()> {
        self.make_dir(&FsPath::parse(path), perm).await
    }

    #[tracing::instrument(skip(self), name = "fs.mkdir_all")]
    async fn mkdir_all(&self, path: &str, perm: u32) -> FsResult<()> {
        let path = FsPath::parse(path);
        for prefix in path.prefixes() {
            match self.make_dir(&prefix, perm).await {
                Ok(()) => {}
                Err(FsError::AlreadyExists(_)) => {
                    let existing = resolve(&self.snapshot(), &prefix).await?.inode;
                    if !existing.is_dir() {
                        return Err(FsError::not_a_directory(prefix.to_string()));
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "fs.remove")]
    async fn remove(&self, path: &str) -> FsResult<()> {
        let path = FsPath::parse(path);
        let Some((parent_path, leaf)) = path.split_leaf() else {
            return Err(FsError::invalid_path("/"));
        };
        let (path, parent_path) = (&path, &parent_path);

        self.engine
            .run("remove", |txn| async move {
                let mut parent = resolve_dir(&txn, parent_path).await?.inode;
                let child_id = parent
                    .meta
                    .entries
                    .remove(leaf)
                    .map_err(|_| FsError::not_found(path.to_string()))?;

                match txn.read_inode(child_id).await {
                    Ok(child) if child.is_dir() && !child.meta.entries.is_empty() => {
                        return Err(FsError::directory_not_empty(path.to_string()));
                    }
                    Ok(_) => {}
                    Err(FsError::NotFound(_)) => {
                        tracing::warn!(%path, child = %child_id, "fs.remove: unlinking dangling entry");
                    }
                    Err(e) => return Err(e),
                }

                parent.meta.modified_at = unix_now();
                txn.put(&parent)?;
                txn.delete(child_id);
                Ok(())
            })
            .await
    }

    #[tracing::instrument(skip(self), name = "fs.remove_all")]
    async fn remove_all(&self, path: &str) -> FsResult<()> {
        let path = FsPath::parse(path);
        let Some((parent_path, leaf)) = path.split_leaf() else {
            return Err(FsError::invalid_path("/"));
        };
        let parent_path = &parent_path;

        let removed = self
            .engine
            .run("remove_all", |txn| async move {
                let mut parent = match resolve_dir(&txn, parent_path).await {
                    Ok(resolution) => resolution.inode,
                    Err(FsError::NotFound(_)) => return Ok(0),
                    Err(e) => return Err(e),
                };
                let Ok(child_id) = parent.meta.entries.remove(leaf) else {
                    return Ok(0);
                };
                parent.meta.modified_at = unix_now();
                txn.put(&parent)?;

                // Every descendant is read, so a concurrent change anywhere
                // in the subtree fails the commit.
                let mut pending = vec![child_id];
                let mut removed = 0usize;
                while let Some(id) = pending.pop() {
                    match txn.read_inode(id).await {
                        Ok(inode) => pending.extend(inode.meta.entries.iter().map(|e| e.child)),
                        Err(FsError::NotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                    txn.delete(id);
                    removed += 1;
                }
                Ok(removed)
            })
            .await?;

        tracing::debug!(removed, "fs.remove_all: done");
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "fs.rename")]
    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let from = FsPath::parse(from);
        let to = FsPath::parse(to);
        let Some((from_parent, from_leaf)) = from.split_leaf() else {
            return Err(FsError::invalid_path("/"));
        };
        let Some((to_parent, to_leaf)) = to.split_leaf() else {
            return Err(FsError::invalid_path("/"));
        };
        let (from, to) = (&from, &to);
        let (from_parent, to_parent) = (&from_parent, &to_parent);

        self.engine
            .run("rename", |txn| async move {
                let mut source = resolve_dir(&txn, from_parent).await?.inode;
                let child_id = source
                    .meta
                    .entries
                    .remove(from_leaf)
                    .map_err(|_| FsError::not_found(from.to_string()))?;
                let now = unix_now();
                source.meta.modified_at = now;

                let target = resolve_dir(&txn, to_parent).await?;
                if target.visited.contains(&child_id) {
                    return Err(FsError::invalid_path(format!("{to} is inside {from}")));
                }

                // Same directory: apply both edits to one copy.
                if target.inode.id == source.id {
                    source
                        .meta
                        .entries
                        .insert(to_leaf, child_id)
                        .map_err(|_| FsError::already_exists(to.to_string()))?;
                    return txn.put(&source);
                }

                let mut dest = target.inode;
                dest.meta
                    .entries
                    .insert(to_leaf, child_id)
                    .map_err(|_| FsError::already_exists(to.to_string()))?;
                dest.meta.modified_at = now;

                txn.put(&source)?;
                txn.put(&dest)
            })
            .await
    }

    #[tracing::instrument(skip(self), name = "fs.open")]
    async fn open(&self, path: &str) -> FsResult<File> {
        self.open_path(FsPath::parse(path)).await
    }

    #[tracing::instrument(skip(self), name = "fs.open_file")]
    async fn open_file(&self, path: &str, flags: OpenFlags, perm: u32) -> FsResult<File> {
        let path = FsPath::parse(path);
        if !flags.mutates() {
            return self.open_path(path).await;
        }

        let Some((parent_path, leaf)) = path.split_leaf() else {
            if flags.create && flags.exclusive {
                return Err(FsError::already_exists("/"));
            }
            if flags.truncate && flags.write {
                return Err(FsError::is_a_directory("/"));
            }
            return self.open_path(path).await;
        };
        let (full, parent_path) = (&path, &parent_path);

        let inode = self
            .engine
            .run("open_file", |txn| async move {
                let mut parent = resolve_dir(&txn, parent_path).await?.inode;

                match parent.meta.entries.find(leaf) {
                    Ok(id) => {
                        if flags.create && flags.exclusive {
                            return Err(FsError::already_exists(full.to_string()));
                        }
                        let mut inode = txn.read_inode(id).await?;
                        if flags.truncate && flags.write {
                            if inode.is_dir() {
                                return Err(FsError::is_a_directory(full.to_string()));
                            }
                            inode.meta.size = 0;
                            inode.meta.modified_at = unix_now();
                            txn.put(&inode)?;
                        }
                        Ok(inode)
                    }
                    Err(_) if flags.create => {
                        let now = unix_now();
                        let inode = Inode::fresh(InodeId::random(), InodeMeta::file(perm, now));
                        parent
                            .meta
                            .entries
                            .insert(leaf, inode.id)
                            .map_err(|_| FsError::already_exists(full.to_string()))?;
                        parent.meta.modified_at = now;
                        txn.create(&inode)?;
                        txn.put(&parent)?;
                        Ok(inode)
                    }
                    Err(_) => Err(FsError::not_found(full.to_string())),
                }
            })
            .await?;

        Ok(File::new(self.backend().clone(), path, inode))
    }

    #[tracing::instrument(skip(self), name = "fs.stat")]
    async fn stat(&self, path: &str) -> FsResult<Metadata> {
        let path = FsPath::parse(path);
        let inode = resolve(&self.snapshot(), &path).await?.inode;
        Ok(Metadata::from_inode(path.name(), &inode))
    }

    #[tracing::instrument(skip(self), name = "fs.chmod")]
    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let path = &FsPath::parse(path);
        self.engine
            .run("chmod", |txn| async move {
                let mut inode = resolve(&txn, path).await?.inode;
                inode.meta.permissions = mode & PERMISSION_MASK;
                txn.put(&inode)
            })
            .await
    }

    #[tracing::instrument(skip(self), name = "fs.chtimes")]
    async fn chtimes(&self, path: &str, _atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        let path = &FsPath::parse(path);
        let modified_at = unix_seconds(mtime);
        self.engine
            .run("chtimes", |txn| async move {
                let mut inode = resolve(&txn, path).await?.inode;
                inode.meta.modified_at = modified_at;
                txn.put(&inode)
            })
            .await
    }
}
