//! Open file handles.

use futures::future::join_all;
use std::sync::Arc;

use kvfs_types::{Inode, InodeId};

use crate::backend::KvBackend;
use crate::error::{FsError, FsResult};
use crate::path::{FsPath, load_inode};
use crate::types::Metadata;

/// A handle on an inode as it was when opened.
///
/// Metadata is not refreshed; reopen to observe later changes. Directory
/// listings read children straight from the backend.
pub struct File {
    backend: Arc<dyn KvBackend>,
    path: FsPath,
    inode: Inode,
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path.to_string())
            .field("id", &self.inode.id)
            .finish()
    }
}

impl File {
    pub(crate) fn new(backend: Arc<dyn KvBackend>, path: FsPath, inode: Inode) -> Self {
        Self {
            backend,
            path,
            inode,
        }
    }

    /// Full cleaned path this handle was opened with.
    pub fn name(&self) -> String {
        self.path.to_string()
    }

    pub fn id(&self) -> InodeId {
        self.inode.id
    }

    pub fn metadata(&self) -> Metadata {
        Metadata::from_inode(self.path.name(), &self.inode)
    }

    /// Entry names in sorted order.
    pub fn read_dir_names(&self) -> FsResult<Vec<String>> {
        self.require_dir()?;
        Ok(self.inode.meta.entries.names())
    }

    /// Entries with their metadata, sorted by name.
    ///
    /// Children removed since the handle was opened are skipped.
    pub async fn read_dir(&self) -> FsResult<Vec<Metadata>> {
        self.require_dir()?;
        let backend = self.backend.as_ref();
        let loads = self
            .inode
            .meta
            .entries
            .iter()
            .map(|entry| async move { (entry, load_inode(backend, entry.child).await) });

        let mut out = Vec::with_capacity(self.inode.meta.entries.len());
        for (entry, loaded) in join_all(loads).await {
            match loaded {
                Ok(child) => out.push(Metadata::from_inode(entry.name.clone(), &child)),
                Err(FsError::NotFound(_)) => {
                    tracing::debug!(name = %entry.name, child = %entry.child, "fs.read_dir: entry vanished");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn require_dir(&self) -> FsResult<()> {
        if self.inode.is_dir() {
            Ok(())
        } else {
            Err(FsError::not_a_directory(self.path.to_string()))
        }
    }
}
