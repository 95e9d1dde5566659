//! Key-value backend contract.
//!
//! kvfs needs exactly two primitives from its store:
//!
//! - [`KvBackend::get`]: read one key together with its [`Version`].
//! - [`KvBackend::commit`]: apply a batch of puts/deletes atomically, but only
//!   if every [`Condition`] in the batch still holds.
//!
//! ## Version semantics
//!
//! Every backend reports a key's version as the store revision at which the
//! key was last modified. Revisions grow monotonically across the whole
//! store and are never reused, so a delete-then-recreate between a read and a
//! commit still fails the condition. A missing key has [`Version::ABSENT`];
//! a condition on `ABSENT` asserts the key does not exist.
//!
//! Implementations:
//!
//! - [`MemoryKv`] - in-process map (tests, single-process use)
//! - [`SqliteKv`] - SQLite file shared by processes on one host
//! - `EtcdKv` - etcd v3 / xline cluster (cargo feature `etcd`)

mod memory;
mod sqlite;

#[cfg(feature = "etcd")]
mod etcd;

use async_trait::async_trait;
use kvfs_types::Version;
use thiserror::Error;

pub use memory::{KvStats, MemoryKv};
pub use sqlite::SqliteKv;

#[cfg(feature = "etcd")]
pub use etcd::EtcdKv;

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: Vec<u8>,
    pub version: Version,
}

/// "This key must still be at this version."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub key: String,
    pub expected: Version,
}

/// One write in a commit batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// Conditions and writes submitted as one atomic unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitBatch {
    pub conditions: Vec<Condition>,
    pub writes: Vec<WriteOp>,
}

impl CommitBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to still be at `expected`.
    pub fn when(mut self, key: impl Into<String>, expected: Version) -> Self {
        self.conditions.push(Condition {
            key: key.into(),
            expected,
        });
        self
    }

    pub fn put(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
        self.writes.push(WriteOp::Put {
            key: key.into(),
            value,
        });
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.writes.push(WriteOp::Delete { key: key.into() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Result of a conditional commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every condition held; all writes applied.
    Committed,
    /// At least one condition failed; nothing applied.
    Conflict,
}

/// Backend failure (unreachable, I/O, protocol).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "etcd")]
    #[error("etcd: {0}")]
    Etcd(#[from] Box<etcd_client::Error>),
}

impl BackendError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

#[cfg(feature = "etcd")]
impl From<etcd_client::Error> for BackendError {
    fn from(e: etcd_client::Error) -> Self {
        BackendError::Etcd(Box::new(e))
    }
}

/// Backend result type.
pub type BackendResult<T> = Result<T, BackendError>;

/// A transactional key-value store with per-key versions.
///
/// Implementations must be safe to share between tasks; kvfs never holds a
/// lock across calls, so all coordination happens inside `commit`.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read a key. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> BackendResult<Option<Versioned>>;

    /// Apply `batch.writes` iff every condition in `batch.conditions` holds.
    async fn commit(&self, batch: CommitBatch) -> BackendResult<CommitOutcome>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
