//! SQLite key-value backend.
//!
//! One table of `(key, value, mod_revision)` plus a single-row revision
//! counter. Commits run inside an IMMEDIATE transaction, so every process
//! that opens the same database file is serialized by SQLite's write lock and
//! sees the same revision sequence.
//!
//! rusqlite is synchronous and a contended write lock can block for up to
//! [`BUSY_TIMEOUT`], so every call runs on tokio's blocking pool.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kvfs_types::Version;

use super::{BackendError, BackendResult, CommitBatch, CommitOutcome, KvBackend, Versioned, WriteOp};

const SCHEMA: &str = r#"
-- Inode records keyed by hex inode id
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    mod_revision INTEGER NOT NULL
);

-- Store-wide revision counter (single row)
CREATE TABLE IF NOT EXISTS revision (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    value INTEGER NOT NULL
);
INSERT OR IGNORE INTO revision (id, value) VALUES (0, 0);
"#;

/// How long a writer waits on another process's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store.
pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKv").finish_non_exhaustive()
    }
}

impl SqliteKv {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> BackendResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> BackendResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> BackendResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Current store revision.
    pub fn revision(&self) -> BackendResult<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT value FROM revision WHERE id = 0", [], |row| {
            row.get(0)
        })?)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> BackendResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> BackendResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| BackendError::unavailable(format!("sqlite worker: {e}")))?
    }
}

fn read_key(conn: &Connection, key: &str) -> BackendResult<Option<Versioned>> {
    let row = conn
        .query_row(
            "SELECT value, mod_revision FROM kv WHERE key = ?1",
            params![key],
            |row| {
                Ok(Versioned {
                    value: row.get(0)?,
                    version: Version::new(row.get(1)?),
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn apply_batch(conn: &mut Connection, batch: &CommitBatch) -> BackendResult<CommitOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    for cond in &batch.conditions {
        let actual: Option<i64> = tx
            .query_row(
                "SELECT mod_revision FROM kv WHERE key = ?1",
                params![cond.key],
                |row| row.get(0),
            )
            .optional()?;
        let actual = actual.map(Version::new).unwrap_or(Version::ABSENT);
        if actual != cond.expected {
            tracing::debug!(
                key = %cond.key,
                expected = %cond.expected,
                actual = %actual,
                "kv.sqlite: condition failed"
            );
            // Dropping the transaction rolls it back.
            return Ok(CommitOutcome::Conflict);
        }
    }

    let revision: i64 = tx.query_row(
        "UPDATE revision SET value = value + 1 WHERE id = 0 RETURNING value",
        [],
        |row| row.get(0),
    )?;

    for write in &batch.writes {
        match write {
            WriteOp::Put { key, value } => {
                tx.execute(
                    "INSERT INTO kv (key, value, mod_revision) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE
                     SET value = excluded.value, mod_revision = excluded.mod_revision",
                    params![key, value, revision],
                )?;
            }
            WriteOp::Delete { key } => {
                tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            }
        }
    }

    tx.commit()?;
    Ok(CommitOutcome::Committed)
}

#[async_trait]
impl KvBackend for SqliteKv {
    async fn get(&self, key: &str) -> BackendResult<Option<Versioned>> {
        let key = key.to_string();
        self.with_conn(move |conn| read_key(conn, &key)).await
    }

    #[tracing::instrument(level = "debug", skip_all, name = "kv.commit", fields(backend = "sqlite", writes = batch.writes.len()))]
    async fn commit(&self, batch: CommitBatch) -> BackendResult<CommitOutcome> {
        self.with_conn(move |conn| apply_batch(conn, &batch)).await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
