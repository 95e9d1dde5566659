//! Namespace formatting.

use kvfs_types::{Inode, InodeId, InodeMeta, unix_now};

use crate::backend::{CommitBatch, CommitOutcome, KvBackend};
use crate::error::{FsError, FsResult};

/// Permission bits of a freshly formatted root.
pub const ROOT_PERM: u32 = 0o755;

/// Write an empty root directory unless one exists.
///
/// Returns `true` when this call created it. Safe to race: the write is
/// guarded so only one formatter wins and the rest see `false`.
pub async fn ensure_root(backend: &dyn KvBackend) -> FsResult<bool> {
    let root = Inode::fresh(InodeId::ROOT, InodeMeta::directory(ROOT_PERM, unix_now()));
    let key = root.key();
    let value = root
        .meta
        .encode()
        .map_err(|source| FsError::decode(key.clone(), source))?;

    let batch = CommitBatch::new().when(key.clone(), root.version).put(key, value);
    match backend.commit(batch).await? {
        CommitOutcome::Committed => {
            tracing::info!(backend = backend.name(), "fs.format: root created");
            Ok(true)
        }
        CommitOutcome::Conflict => Ok(false),
    }
}
