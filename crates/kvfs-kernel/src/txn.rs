//! Optimistic transactions over the key-value backend.
//!
//! A filesystem operation is a closure run by [`TxnEngine::run`]. Each
//! attempt gets a fresh [`Txn`]: every inode read through it is fenced (its
//! key must still be at the observed version when the batch commits), and
//! every write is only staged. When the closure returns, all fences and
//! staged writes go to the backend as one conditional commit.
//!
//! - Commit applied: the engine returns the closure's value.
//! - Commit refused (some fenced inode moved on): the attempt is thrown away
//!   and the closure runs again from scratch, with fresh reads, after a
//!   jittered backoff.
//! - Closure error: returned as is. Structural errors (`NotFound`,
//!   `AlreadyExists`, ...) would only repeat on retry.
//!
//! Path resolution reads through the same [`Txn`], so every ancestor of the
//! touched inodes is fenced as well. A write to any directory on the path
//! (`mkdir /new` rewriting the root while `mkdir /left/x` is in flight) fails
//! the deeper operation's commit and it retries. The same fences stop two
//! crossed renames (`mv /r/a /s/b/x` and `mv /s/b /r/a/y`) from both landing
//! and detaching a directory cycle from the root. Operations whose paths
//! share only unmodified ancestors never conflict.
//!
//! No lock is held between calls; the backend's commit is the only point
//! of coordination. Attempts are bounded by [`RetryPolicy`] and exhaustion
//! surfaces as [`FsError::Busy`].

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use kvfs_types::{Inode, InodeId, Version};

use crate::backend::{CommitBatch, CommitOutcome, Condition, KvBackend, WriteOp};
use crate::error::{FsError, FsResult};
use crate::path::{InodeReader, load_inode};

/// Retry bounds for conflicting commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before giving up with `Busy` (at least one is always made).
    pub max_attempts: u32,
    /// Backoff ceiling after the first conflict; doubles per attempt.
    pub base_backoff_ms: u64,
    /// Cap on the backoff ceiling.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 16,
            base_backoff_ms: 2,
            max_backoff_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Largest sleep after conflict number `attempt` (1-based).
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let ceiling = self.base_backoff_ms.saturating_mul(1 << shift);
        Duration::from_millis(ceiling.min(self.max_backoff_ms))
    }

    /// Full-jitter sleep in `[0, backoff_ceiling(attempt)]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }
}

#[derive(Debug, Default)]
struct TxnState {
    /// Inodes read in this attempt; later reads are served from here.
    reads: IndexMap<InodeId, Inode>,
    /// key -> version the commit must still find.
    conditions: IndexMap<String, Version>,
    /// key -> final staged write. A later write to a key replaces the earlier one.
    writes: IndexMap<String, WriteOp>,
}

/// One attempt's read set and staged writes.
///
/// Cheap to clone; clones share state. Nothing reaches the backend until the
/// engine commits.
#[derive(Clone)]
pub struct Txn {
    backend: Arc<dyn KvBackend>,
    state: Arc<Mutex<TxnState>>,
}

impl std::fmt::Debug for Txn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Txn")
            .field("reads", &state.reads.len())
            .field("conditions", &state.conditions.len())
            .field("writes", &state.writes.len())
            .finish()
    }
}

impl Txn {
    fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(TxnState::default())),
        }
    }

    /// Read an inode and fence on the version seen.
    ///
    /// Repeated reads of one id within an attempt return the first copy.
    pub async fn read_inode(&self, id: InodeId) -> FsResult<Inode> {
        let cached = self.state.lock().reads.get(&id).cloned();
        if let Some(inode) = cached {
            return Ok(inode);
        }

        let inode = load_inode(self.backend.as_ref(), id).await?;
        let mut state = self.state.lock();
        state.conditions.entry(inode.key()).or_insert(inode.version);
        state.reads.insert(id, inode.clone());
        Ok(inode)
    }

    /// Stage an update of an existing inode.
    pub fn put(&self, inode: &Inode) -> FsResult<()> {
        let key = inode.key();
        let value = inode
            .meta
            .encode()
            .map_err(|source| FsError::decode(key.clone(), source))?;
        self.state
            .lock()
            .writes
            .insert(key.clone(), WriteOp::Put { key, value });
        Ok(())
    }

    /// Stage a brand-new inode; the commit fails if its key already exists.
    pub fn create(&self, inode: &Inode) -> FsResult<()> {
        self.state
            .lock()
            .conditions
            .insert(inode.key(), Version::ABSENT);
        self.put(inode)
    }

    /// Stage removal of an inode record.
    pub fn delete(&self, id: InodeId) {
        let key = id.to_key();
        self.state
            .lock()
            .writes
            .insert(key.clone(), WriteOp::Delete { key });
    }

    fn take_batch(&self) -> CommitBatch {
        let mut state = self.state.lock();
        let conditions = std::mem::take(&mut state.conditions)
            .into_iter()
            .map(|(key, expected)| Condition { key, expected })
            .collect();
        let writes = std::mem::take(&mut state.writes).into_values().collect();
        CommitBatch { conditions, writes }
    }
}

#[async_trait]
impl InodeReader for Txn {
    async fn read_inode(&self, id: InodeId) -> FsResult<Inode> {
        Txn::read_inode(self, id).await
    }
}

/// Runs operations as optimistic transactions against one backend.
#[derive(Clone)]
pub struct TxnEngine {
    backend: Arc<dyn KvBackend>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for TxnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnEngine")
            .field("backend", &self.backend.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl TxnEngine {
    pub fn new(backend: Arc<dyn KvBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Run `body` until its staged batch commits or it fails.
    ///
    /// `body` gets a fresh [`Txn`] per attempt and must redo all of its
    /// reads through it. An attempt that stages no writes returns without a
    /// commit round trip.
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut body: F) -> FsResult<T>
    where
        F: FnMut(Txn) -> Fut,
        Fut: Future<Output = FsResult<T>>,
    {
        let attempts = self.policy.attempts();
        for attempt in 1..=attempts {
            let span = tracing::debug_span!("txn.attempt", op, attempt);
            if let Some(value) = self.attempt(&mut body).instrument(span).await? {
                return Ok(value);
            }
            if attempt < attempts {
                let delay = self.policy.backoff(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::warn!(op, attempts, "txn.exhausted");
        Err(FsError::Busy { op, attempts })
    }

    /// One attempt. `None` when the commit lost to a concurrent writer.
    async fn attempt<T, F, Fut>(&self, body: &mut F) -> FsResult<Option<T>>
    where
        F: FnMut(Txn) -> Fut,
        Fut: Future<Output = FsResult<T>>,
    {
        let txn = Txn::new(self.backend.clone());
        let value = body(txn.clone()).await?;

        let batch = txn.take_batch();
        if batch.is_empty() {
            tracing::debug!("txn.read_only");
            return Ok(Some(value));
        }

        let (conditions, writes) = (batch.conditions.len(), batch.writes.len());
        match self.backend.commit(batch).await? {
            CommitOutcome::Committed => {
                tracing::debug!(conditions, writes, "txn.committed");
                Ok(Some(value))
            }
            CommitOutcome::Conflict => {
                tracing::debug!(conditions, writes, "txn.conflict");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, MemoryKv, Versioned};
    use kvfs_types::InodeMeta;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Refuses the first `conflicts` commits, then delegates.
    struct FlakyKv {
        inner: MemoryKv,
        conflicts: AtomicU32,
    }

    impl FlakyKv {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: MemoryKv::new(),
                conflicts: AtomicU32::new(conflicts),
            }
        }
    }

    #[async_trait]
    impl KvBackend for FlakyKv {
        async fn get(&self, key: &str) -> BackendResult<Option<Versioned>> {
            self.inner.get(key).await
        }

        async fn commit(&self, batch: CommitBatch) -> BackendResult<CommitOutcome> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Ok(CommitOutcome::Conflict);
            }
            self.inner.commit(batch).await
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn file(id: u64) -> Inode {
        Inode::fresh(InodeId::from_raw(id), InodeMeta::file(0o644, 0))
    }

    #[test]
    fn test_backoff_ceiling_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff_ms: 2,
            max_backoff_ms: 20,
        };
        assert_eq!(policy.backoff_ceiling(1), Duration::from_millis(2));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_millis(4));
        assert_eq!(policy.backoff_ceiling(4), Duration::from_millis(16));
        assert_eq!(policy.backoff_ceiling(5), Duration::from_millis(20));
        assert_eq!(policy.backoff_ceiling(u32::MAX), Duration::from_millis(20));
        for attempt in 1..10 {
            assert!(policy.backoff(attempt) <= policy.backoff_ceiling(attempt));
        }
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        assert_eq!(RetryPolicy::immediate(0).attempts(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_commit() {
        let engine = TxnEngine::new(Arc::new(FlakyKv::new(3)), RetryPolicy::immediate(5));
        let calls = AtomicU32::new(0);

        engine
            .run("test", |txn| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { txn.create(&file(7)) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_busy_after_exhaustion() {
        let engine = TxnEngine::new(Arc::new(FlakyKv::new(10)), RetryPolicy::immediate(3));
        let err = engine
            .run("mkdir", |txn| async move { txn.create(&file(7)) })
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::Busy { op: "mkdir", attempts: 3 }));
    }

    #[tokio::test]
    async fn test_body_error_is_not_retried() {
        let kv = Arc::new(MemoryKv::new());
        let engine = TxnEngine::new(kv.clone(), RetryPolicy::immediate(5));
        let calls = AtomicU32::new(0);

        let err = engine
            .run("test", |txn| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    txn.create(&file(1))?;
                    Err::<(), _>(FsError::already_exists("/x"))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FsError::AlreadyExists(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(kv.stats().commits, 0);
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_read_only_attempt_skips_commit() {
        let kv = Arc::new(MemoryKv::new());
        kv.commit(CommitBatch::new().put("1", InodeMeta::file(0o644, 0).encode().unwrap()))
            .await
            .unwrap();
        let engine = TxnEngine::new(kv.clone(), RetryPolicy::default());

        let inode = engine
            .run("stat", |txn| async move { txn.read_inode(InodeId::from_raw(1)).await })
            .await
            .unwrap();

        assert_eq!(inode.meta.permissions, 0o644);
        assert_eq!(kv.stats().commits, 1);
    }

    #[tokio::test]
    async fn test_repeated_reads_fence_once_and_writes_merge() {
        let kv = Arc::new(MemoryKv::new());
        kv.commit(CommitBatch::new().put("1", InodeMeta::directory(0o755, 0).encode().unwrap()))
            .await
            .unwrap();

        let txn = Txn::new(kv.clone());
        let mut first = txn.read_inode(InodeId::from_raw(1)).await.unwrap();
        let second = txn.read_inode(InodeId::from_raw(1)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(kv.stats().gets, 1);

        first.meta.permissions = 0o700;
        txn.put(&first).unwrap();
        first.meta.permissions = 0o711;
        txn.put(&first).unwrap();

        let batch = txn.take_batch();
        assert_eq!(batch.conditions.len(), 1);
        assert_eq!(batch.writes.len(), 1);
        match &batch.writes[0] {
            WriteOp::Put { value, .. } => {
                assert_eq!(InodeMeta::decode(value).unwrap().permissions, 0o711);
            }
            other => panic!("unexpected write {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_collision_conflicts() {
        let kv = Arc::new(MemoryKv::new());
        let engine = TxnEngine::new(kv.clone(), RetryPolicy::immediate(2));
        engine
            .run("create", |txn| async move { txn.create(&file(9)) })
            .await
            .unwrap();

        let err = engine
            .run("create", |txn| async move { txn.create(&file(9)) })
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::Busy { .. }));
        assert_eq!(kv.stats().conflicts, 2);
    }
}
