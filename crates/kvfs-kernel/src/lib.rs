//! # kvfs-kernel
//!
//! A hierarchical filesystem namespace kept in a transactional key-value
//! store. Every inode is one key; every mutating operation is one optimistic
//! transaction that commits only if nothing it read has changed since. Any
//! number of processes or hosts can share a namespace through the store with
//! no lock server.
//!
//! ```text
//! FileSystem (KvFs)           mkdir, rename, remove, chmod, stat, open...
//!     │
//!     ├── path::resolve        root → segment → ... → target
//!     ├── txn::TxnEngine       fenced reads, staged writes, retry on conflict
//!     │
//! KvBackend                   get(key) / commit(conditions, writes)
//!     ├── MemoryKv
//!     ├── SqliteKv
//!     └── EtcdKv  (feature `etcd`)
//! ```
//!
//! A namespace has to be formatted once with [`ensure_root`] before use.

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod file;
pub mod fs;
pub mod ops;
pub mod path;
pub mod txn;
pub mod types;

pub use backend::{
    BackendError, BackendResult, CommitBatch, CommitOutcome, Condition, KvBackend, KvStats,
    MemoryKv, SqliteKv, Versioned, WriteOp,
};
#[cfg(feature = "etcd")]
pub use backend::EtcdKv;
pub use bootstrap::{ROOT_PERM, ensure_root};
pub use config::{BackendConfig, ConfigError, KvfsConfig};
pub use error::{FsError, FsResult};
pub use file::File;
pub use fs::KvFs;
pub use ops::FileSystem;
pub use path::FsPath;
pub use txn::{RetryPolicy, Txn, TxnEngine};
pub use types::{FileType, Metadata, OpenFlags};

pub use kvfs_types::{InodeId, Version, unix_seconds};
