//! In-memory key-value backend.
//!
//! Used for tests and single-process namespaces. All data is ephemeral.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use kvfs_types::Version;

use super::{BackendResult, CommitBatch, CommitOutcome, KvBackend, Versioned, WriteOp};

#[derive(Debug, Default)]
struct State {
    /// Store revision, bumped once per applied commit.
    revision: i64,
    /// key -> (value, mod revision)
    entries: HashMap<String, (Vec<u8>, i64)>,
}

impl State {
    fn version_of(&self, key: &str) -> Version {
        self.entries
            .get(key)
            .map(|(_, rev)| Version::new(*rev))
            .unwrap_or(Version::ABSENT)
    }
}

/// Call counters, for asserting retry behaviour in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KvStats {
    pub gets: u64,
    pub commits: u64,
    pub conflicts: u64,
}

/// In-memory backend.
///
/// Thread-safe via an internal mutex that is never held across an await.
#[derive(Debug, Default)]
pub struct MemoryKv {
    state: Mutex<State>,
    gets: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
}

impl MemoryKv {
    /// Create an empty store (no root inode).
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Current store revision.
    pub fn revision(&self) -> i64 {
        self.state.lock().revision
    }

    pub fn stats(&self) -> KvStats {
        KvStats {
            gets: self.gets.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> BackendResult<Option<Versioned>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock();
        Ok(state.entries.get(key).map(|(value, rev)| Versioned {
            value: value.clone(),
            version: Version::new(*rev),
        }))
    }

    async fn commit(&self, batch: CommitBatch) -> BackendResult<CommitOutcome> {
        self.commits.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();

        if let Some(failed) = batch
            .conditions
            .iter()
            .find(|c| state.version_of(&c.key) != c.expected)
        {
            tracing::debug!(
                key = %failed.key,
                expected = %failed.expected,
                actual = %state.version_of(&failed.key),
                "kv.memory: condition failed"
            );
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            return Ok(CommitOutcome::Conflict);
        }

        state.revision += 1;
        let revision = state.revision;
        for write in batch.writes {
            match write {
                WriteOp::Put { key, value } => {
                    state.entries.insert(key, (value, revision));
                }
                WriteOp::Delete { key } => {
                    state.entries.remove(&key);
                }
            }
        }
        Ok(CommitOutcome::Committed)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_sets_revision_version() {
        let kv = MemoryKv::new();
        let outcome = kv
            .commit(CommitBatch::new().put("a", b"one".to_vec()))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);

        let got = kv.get("a").await.unwrap().unwrap();
        assert_eq!(got.value, b"one");
        assert_eq!(got.version, Version::new(1));
    }

    #[tokio::test]
    async fn test_absent_condition() {
        let kv = MemoryKv::new();
        let create = || CommitBatch::new().when("a", Version::ABSENT).put("a", b"x".to_vec());

        assert_eq!(kv.commit(create()).await.unwrap(), CommitOutcome::Committed);
        assert_eq!(kv.commit(create()).await.unwrap(), CommitOutcome::Conflict);
        assert_eq!(kv.stats().conflicts, 1);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts_and_applies_nothing() {
        let kv = MemoryKv::new();
        kv.commit(CommitBatch::new().put("a", b"1".to_vec()).put("b", b"1".to_vec()))
            .await
            .unwrap();
        let seen = kv.get("a").await.unwrap().unwrap().version;

        // Someone else bumps `a`.
        kv.commit(CommitBatch::new().put("a", b"2".to_vec())).await.unwrap();

        let outcome = kv
            .commit(
                CommitBatch::new()
                    .when("a", seen)
                    .put("a", b"3".to_vec())
                    .delete("b"),
            )
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict);
        assert_eq!(kv.get("a").await.unwrap().unwrap().value, b"2");
        assert!(kv.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_and_recreate_changes_version() {
        let kv = MemoryKv::new();
        kv.commit(CommitBatch::new().put("a", b"1".to_vec())).await.unwrap();
        let seen = kv.get("a").await.unwrap().unwrap().version;

        kv.commit(CommitBatch::new().delete("a")).await.unwrap();
        kv.commit(CommitBatch::new().put("a", b"1".to_vec())).await.unwrap();

        let now = kv.get("a").await.unwrap().unwrap().version;
        assert_ne!(seen, now);
        let outcome = kv
            .commit(CommitBatch::new().when("a", seen).delete("a"))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict);
    }
}
